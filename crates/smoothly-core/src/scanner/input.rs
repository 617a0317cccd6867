//! Scan target grammar.
//!
//! A scan input is a comma-separated list of targets:
//!
//! | Token             | Addresses                         |
//! |-------------------|-----------------------------------|
//! | `192.168.1.*`     | `192.168.1.0` ..= `192.168.1.255` |
//! | `192.168.1.10-20` | `192.168.1.10` ..= `192.168.1.20` |
//! | `192.168.1.102`   | that address                      |
//! | `smoothie.local`  | that hostname                     |
//!
//! Addresses are produced in input order, duplicates included.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CoreError;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// One target of a scan input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanTarget {
    /// Every host of a /24: `a.b.c.*`.
    Wildcard { network: [u8; 3] },
    /// An inclusive host range of a /24: `a.b.c.x-y`.
    Range { network: [u8; 3], start: u8, end: u8 },
    Single { ip: Ipv4Addr },
    Hostname { name: String },
}

impl ScanTarget {
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CoreError::invalid_input(token, "empty target"));
        }

        let labels: Vec<&str> = token.split('.').collect();
        if let [a, b, c, host] = labels.as_slice() {
            if let (Some(a), Some(b), Some(c)) = (octet(a), octet(b), octet(c)) {
                return Self::parse_host_part(token, [a, b, c], host);
            }
        }

        if labels.iter().all(|label| is_numeric(label)) {
            return Err(CoreError::invalid_input(token, "not a valid IPv4 address"));
        }
        validate_hostname(token)?;
        Ok(Self::Hostname {
            name: token.to_ascii_lowercase(),
        })
    }

    fn parse_host_part(token: &str, network: [u8; 3], host: &str) -> Result<Self, CoreError> {
        if host == "*" {
            return Ok(Self::Wildcard { network });
        }
        if let Some((start, end)) = host.split_once('-') {
            let (Some(start), Some(end)) = (octet(start), octet(end)) else {
                return Err(CoreError::invalid_input(
                    token,
                    "range bounds must be numbers between 0 and 255",
                ));
            };
            if start > end {
                return Err(CoreError::invalid_input(
                    token,
                    format!("range start {start} is greater than range end {end}"),
                ));
            }
            return Ok(Self::Range {
                network,
                start,
                end,
            });
        }
        let Some(host) = octet(host) else {
            return Err(CoreError::invalid_input(token, "not a valid IPv4 address"));
        };
        let [a, b, c] = network;
        Ok(Self::Single {
            ip: Ipv4Addr::new(a, b, c, host),
        })
    }

    /// Number of addresses this target expands to.
    pub fn len(&self) -> usize {
        match self {
            Self::Wildcard { .. } => 256,
            Self::Range { start, end, .. } => usize::from(*end - *start) + 1,
            Self::Single { .. } | Self::Hostname { .. } => 1,
        }
    }

    /// Always `false`; every target names at least one address.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Append this target's addresses to `out`, in ascending order.
    pub fn expand_into(&self, out: &mut Vec<String>) {
        match self {
            Self::Wildcard { network: [a, b, c] } => {
                out.extend((0..=u8::MAX).map(|host| format!("{a}.{b}.{c}.{host}")));
            }
            Self::Range {
                network: [a, b, c],
                start,
                end,
            } => {
                out.extend((*start..=*end).map(|host| format!("{a}.{b}.{c}.{host}")));
            }
            Self::Single { ip } => out.push(ip.to_string()),
            Self::Hostname { name } => out.push(name.clone()),
        }
    }
}

impl FromStr for ScanTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard { network: [a, b, c] } => write!(f, "{a}.{b}.{c}.*"),
            Self::Range {
                network: [a, b, c],
                start,
                end,
            } => write!(f, "{a}.{b}.{c}.{start}-{end}"),
            Self::Single { ip } => write!(f, "{ip}"),
            Self::Hostname { name } => f.write_str(name),
        }
    }
}

/// An ordered, validated list of scan targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanInput {
    targets: Vec<ScanTarget>,
}

impl ScanInput {
    /// Parse a comma-separated input such as `"192.168.1.*, 10.0.0.5"`.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        Self::from_tokens(input.split(','))
    }

    /// Parse a list of tokens, one target each. A blank token among
    /// others is an invalid target.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens: Vec<S> = tokens.into_iter().collect();
        if tokens.iter().all(|token| token.as_ref().trim().is_empty()) {
            return Err(CoreError::invalid_input("", "no scan targets given"));
        }

        let targets = tokens
            .iter()
            .map(|token| ScanTarget::parse(token.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { targets })
    }

    pub fn targets(&self) -> &[ScanTarget] {
        &self.targets
    }

    /// Total number of addresses, duplicates included.
    pub fn len(&self) -> usize {
        self.targets.iter().map(ScanTarget::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Every address to probe, in input order.
    pub fn addresses(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len());
        for target in &self.targets {
            target.expand_into(&mut out);
        }
        out
    }
}

impl FromStr for ScanInput {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScanInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, target) in self.targets.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{target}")?;
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn is_numeric(label: &str) -> bool {
    !label.is_empty() && label.bytes().all(|b| b.is_ascii_digit())
}

/// A decimal octet: 1-3 digits, value 0-255. Signs are not accepted.
fn octet(label: &str) -> Option<u8> {
    if !is_numeric(label) || label.len() > 3 {
        return None;
    }
    label.parse().ok()
}

fn validate_hostname(name: &str) -> Result<(), CoreError> {
    if name.len() > MAX_HOSTNAME_LEN {
        return Err(CoreError::invalid_input(name, "hostname is too long"));
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(CoreError::invalid_input(
                name,
                "hostname labels must be 1 to 63 characters",
            ));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(CoreError::invalid_input(
                name,
                "hostnames may only contain letters, digits and '-'",
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(CoreError::invalid_input(
                name,
                "hostname labels cannot start or end with '-'",
            ));
        }
    }
    Ok(())
}
