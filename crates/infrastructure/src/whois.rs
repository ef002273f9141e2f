use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use nodewatch_application::ports::{WhoisLookup, WhoisService};
use nodewatch_domain::DomainError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const WHOIS_PORT: u16 = 43;
const RESPONSE_CAP: usize = 16 * 1024;

/// Raw TCP client against port 43 of a registrar's WHOIS server, resolved
/// via a small static IANA-referral table. Unknown TLDs are a transient
/// error rather than `NotFound`, since it may just be a gap in the seeded
/// table, not proof the domain doesn't exist — the WHOIS Worker drops and
/// retries on transient errors per §4.8/§4.9.
pub struct WhoisClient {
    servers: HashMap<String, String>,
    timeout: Duration,
}

impl WhoisClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            servers: default_referral_table(),
            timeout,
        }
    }

    fn server_for(&self, domain: &str) -> Option<&str> {
        let tld = domain.rsplit('.').next()?;
        self.servers.get(tld).map(String::as_str)
    }
}

#[async_trait]
impl WhoisService for WhoisClient {
    async fn lookup(&self, domain: &str) -> Result<WhoisLookup, DomainError> {
        let server = self
            .server_for(domain)
            .ok_or_else(|| DomainError::Whois(format!("no WHOIS referral for {domain}")))?;

        let connect = tokio::time::timeout(self.timeout, TcpStream::connect((server, WHOIS_PORT)))
            .await
            .map_err(|_| DomainError::Whois(format!("connect to {server} timed out")))?
            .map_err(|e| DomainError::Whois(format!("connect to {server} failed: {e}")))?;

        let mut stream = connect;
        let query = format!("{domain}\r\n");
        tokio::time::timeout(self.timeout, stream.write_all(query.as_bytes()))
            .await
            .map_err(|_| DomainError::Whois("write timed out".to_string()))?
            .map_err(|e| DomainError::Whois(format!("write failed: {e}")))?;

        let mut buf = Vec::with_capacity(RESPONSE_CAP);
        let mut chunk = [0u8; 4096];
        loop {
            let read = match tokio::time::timeout(self.timeout, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(DomainError::Whois(format!("read failed: {e}"))),
                Err(_) => break, // peer kept the connection open past the timeout; use what we have
            };
            buf.extend_from_slice(&chunk[..read]);
            if buf.len() >= RESPONSE_CAP {
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf);
        debug!(domain, bytes = buf.len(), "whois response received");
        Ok(parse_response(&text))
    }
}

fn parse_response(text: &str) -> WhoisLookup {
    let lower = text.to_ascii_lowercase();
    if lower.contains("no match") || lower.contains("not found") || lower.contains("no entries found") {
        return WhoisLookup::NotFound;
    }

    let registrar = find_field(text, &["Registrar:", "registrar:"]);
    let expiration = find_field(
        text,
        &[
            "Registry Expiry Date:",
            "Registrar Registration Expiration Date:",
            "Expiration Date:",
            "expire:",
        ],
    )
    .and_then(|raw| parse_expiration(&raw));

    WhoisLookup::Found {
        registrar,
        expiration,
    }
}

fn find_field(text: &str, labels: &[&str]) -> Option<String> {
    for line in text.lines() {
        for label in labels {
            if let Some(rest) = line.strip_prefix(label) {
                let value = rest.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).and_then(|dt| Utc.from_local_datetime(&dt).single());
    }
    None
}

/// Seeded for the TLDs exercised in tests and the common gTLDs this
/// directory's hostnames tend to use.
fn default_referral_table() -> HashMap<String, String> {
    [
        ("com", "whois.verisign-grs.com"),
        ("net", "whois.verisign-grs.com"),
        ("org", "whois.pir.org"),
        ("info", "whois.afilias.net"),
        ("io", "whois.nic.io"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
