const MONITOR_CONFIG: &str = "MONITOR_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.json";

pub fn get_config_path() -> String {
    std::env::var(MONITOR_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const MONITOR_SMTP_PASSWORD: &str = "MONITOR_SMTP_PASSWORD";

/// SMTP password from the environment, used when the config file has none
pub fn get_smtp_password() -> Option<String> {
    std::env::var(MONITOR_SMTP_PASSWORD)
        .ok()
        .filter(|password| !password.is_empty())
}

/// Name announced in SMTP greetings and webhook payloads
pub fn get_host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| String::from("localhost"))
}
