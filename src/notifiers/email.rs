//! Email notifier
//!
//! Sends a plain-text summary of all unhealthy results to a fixed list of
//! recipients through an SMTP relay. The session is upgraded with STARTTLS
//! whenever the server offers it, and credentials are only ever sent to a
//! remote host over an encrypted connection.

use std::fmt::Write as _;
use std::net::IpAddr;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{Tls, TlsParameters},
        extension::ClientId,
    },
};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::{
    CheckResult, Deadline, Settings,
    error::{PluginError, PluginResult},
    registry::Plugin,
    util::{get_host_name, get_smtp_password},
};

use super::{Notifier, optional_str, required_str, unhealthy};

pub const NAME: &str = "email";

/// Port on which SMTP is wrapped in TLS from the first byte
const SMTPS_PORT: u16 = 465;

/// How the SMTP session is protected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Implicit TLS (SMTPS)
    Wrapper,
    /// STARTTLS must succeed before anything else is sent
    Required,
    /// STARTTLS if the server advertises it
    Opportunistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn parse_mailbox(address: &str) -> PluginResult<Mailbox> {
    address
        .parse()
        .map_err(|e| PluginError::Config(format!("invalid email address '{address}': {e}")))
}

impl EmailSettings {
    fn parse(settings: &Settings) -> PluginResult<Self> {
        let from = parse_mailbox(required_str(settings, "from")?)?;

        let to = match settings.get("to") {
            None => return Err(PluginError::Config("missing 'to'".to_string())),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| {
                    entry
                        .as_str()
                        .ok_or_else(|| {
                            PluginError::Config(
                                "'to' field must be an array of email addresses".to_string(),
                            )
                        })
                        .and_then(parse_mailbox)
                })
                .collect::<PluginResult<Vec<_>>>()?,
            Some(_) => {
                return Err(PluginError::Config(
                    "'to' field must be an array of email addresses".to_string(),
                ));
            }
        };
        if to.is_empty() {
            return Err(PluginError::Config("no valid 'to' addresses".to_string()));
        }

        let smtp_server = required_str(settings, "smtp_server")?.to_string();

        let smtp_port = settings
            .get("smtp_port")
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .filter(|port| *port > 0)
            .ok_or_else(|| PluginError::Config("missing or invalid 'smtp_port'".to_string()))?;

        Ok(Self {
            from,
            to,
            smtp_server,
            smtp_port,
            username: optional_str(settings, "username"),
            password: optional_str(settings, "password").or_else(get_smtp_password),
        })
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Authentication over plaintext is only allowed towards the local host
    pub fn tls_mode(&self) -> TlsMode {
        if self.smtp_port == SMTPS_PORT {
            TlsMode::Wrapper
        } else if self.credentials().is_some() && !is_loopback(&self.smtp_server) {
            TlsMode::Required
        } else {
            TlsMode::Opportunistic
        }
    }
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

#[derive(Debug, Default)]
pub struct EmailNotifier {
    settings: RwLock<Option<EmailSettings>>,
}

impl EmailNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> Option<EmailSettings> {
        self.settings.read().clone()
    }
}

fn transport(
    settings: &EmailSettings,
    deadline: Deadline,
) -> PluginResult<AsyncSmtpTransport<Tokio1Executor>> {
    let parameters = TlsParameters::new(settings.smtp_server.clone())
        .map_err(|e| PluginError::Notify(format!("invalid TLS parameters: {e}")))?;
    let tls = match settings.tls_mode() {
        TlsMode::Wrapper => Tls::Wrapper(parameters),
        TlsMode::Required => Tls::Required(parameters),
        TlsMode::Opportunistic => Tls::Opportunistic(parameters),
    };

    let mut builder =
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.smtp_server.as_str())
            .port(settings.smtp_port)
            .tls(tls)
            .hello_name(ClientId::Domain(get_host_name()))
            .timeout(Some(deadline.remaining()));

    if let Some((username, password)) = settings.credentials() {
        builder = builder
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .authentication(vec![Mechanism::Plain, Mechanism::Login]);
    }

    Ok(builder.build())
}

impl Plugin for EmailNotifier {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn init(&self, settings: &Settings) -> PluginResult<()> {
        let parsed = EmailSettings::parse(settings).inspect_err(|e| {
            error!("failed to initialize email notifier: {e}");
        })?;
        *self.settings.write() = Some(parsed);
        Ok(())
    }

    #[instrument(skip_all, fields(notifier = NAME))]
    async fn notify(&self, deadline: Deadline, results: &[CheckResult]) -> PluginResult<()> {
        let issues = unhealthy(results);
        if issues.is_empty() {
            return Ok(());
        }

        let settings = self
            .settings()
            .ok_or_else(|| PluginError::Notify("email notifier not initialized".to_string()))?;

        let message = compose_message(&settings, &issues)?;
        let transport = transport(&settings, deadline)?;

        tokio::time::timeout_at(deadline.instant(), transport.send(message))
            .await
            .map_err(|_| PluginError::Notify("deadline exceeded while sending email".to_string()))?
            .map_err(|e| PluginError::Notify(format!("failed to send email: {e}")))
            .inspect_err(|e| error!("{e}"))?;

        debug!("email notification sent for {} issue(s)", issues.len());
        Ok(())
    }

    async fn close(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// Build the message; the transfer encoding is picked from the body content
fn compose_message(settings: &EmailSettings, results: &[&CheckResult]) -> PluginResult<Message> {
    let mut builder = Message::builder()
        .from(settings.from.clone())
        .subject(format!("Server Alert: {} issue(s) detected", results.len()))
        .date_now()
        .header(ContentType::TEXT_PLAIN);
    for recipient in &settings.to {
        builder = builder.to(recipient.clone());
    }

    builder
        .body(format_body(results))
        .map_err(|e| PluginError::Notify(format!("failed to build email: {e}")))
}

pub fn format_body(results: &[&CheckResult]) -> String {
    let mut body = String::from("The following issues were detected on the server:\n\n");

    for (i, result) in results.iter().enumerate() {
        let _ = writeln!(
            body,
            "{}. [{}] {}",
            i + 1,
            result.timestamp.to_rfc2822(),
            result.message.as_deref().unwrap_or_default()
        );

        if !result.metrics.is_empty() {
            body.push_str("   Metrics:\n");
            let mut metrics: Vec<_> = result.metrics.iter().collect();
            metrics.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in metrics {
                let _ = writeln!(body, "   - {key}: {value:.2}");
            }
        }

        body.push('\n');
    }

    body.push_str("\n--\n");
    body.push_str("This is an automated message from the server monitoring system.\n");
    body.push_str("Please do not reply to this email.\n");
    body
}
