//! Issuance, courier, agent and outbox configuration loaded from environment
//! variables.

use std::str::FromStr;
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Issuance settings.
///
/// Reads from environment variables:
/// - `TRANSACTION_TIMEOUT_SECS` — creating transaction budget (default: `30`)
/// - `DIRECT_BRANCH_NAME` — fallback branch when none is supplied (default: `"Direct"`)
#[derive(Debug, Clone)]
pub struct IssuanceConfig {
    pub transaction_timeout: Duration,
    pub direct_branch_name: String,
}

impl IssuanceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            transaction_timeout: Duration::from_secs(env_parse(
                "TRANSACTION_TIMEOUT_SECS",
                defaults.transaction_timeout.as_secs(),
            )),
            direct_branch_name: env_or("DIRECT_BRANCH_NAME", &defaults.direct_branch_name),
        }
    }
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(30),
            direct_branch_name: "Direct".to_string(),
        }
    }
}

/// Sender identity printed on the consignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipperIdentity {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
}

/// One courier account; conventional and takaful policies ship from
/// separate accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourierAccount {
    pub username: String,
    pub password: String,
    pub shipper: ShipperIdentity,
}

impl CourierAccount {
    fn from_env(prefix: &str, defaults: &CourierAccount) -> Self {
        let key = |name: &str| format!("{prefix}_{name}");
        Self {
            username: env_or(&key("USERNAME"), &defaults.username),
            password: env_or(&key("PASSWORD"), &defaults.password),
            shipper: ShipperIdentity {
                name: env_or(&key("SHIPPER_NAME"), &defaults.shipper.name),
                phone: env_or(&key("SHIPPER_PHONE"), &defaults.shipper.phone),
                address: env_or(&key("SHIPPER_ADDRESS"), &defaults.shipper.address),
                city: env_or(&key("SHIPPER_CITY"), &defaults.shipper.city),
            },
        }
    }
}

/// Courier API settings injected into the booking agent.
///
/// Reads `COURIER_BASE_URL`, `COURIER_TIMEOUT_SECS` (default `15`) and, per
/// account, `COURIER_*` / `COURIER_TAKAFUL_*` with `USERNAME`, `PASSWORD`,
/// `SHIPPER_NAME`, `SHIPPER_PHONE`, `SHIPPER_ADDRESS` and `SHIPPER_CITY`.
#[derive(Debug, Clone)]
pub struct CourierConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub conventional: CourierAccount,
    pub takaful: CourierAccount,
}

impl CourierConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_or("COURIER_BASE_URL", &defaults.base_url),
            timeout: Duration::from_secs(env_parse(
                "COURIER_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )),
            conventional: CourierAccount::from_env("COURIER", &defaults.conventional),
            takaful: CourierAccount::from_env("COURIER_TAKAFUL", &defaults.takaful),
        }
    }

    /// Returns the account that ships the given policy flavour.
    pub fn account_for(&self, takaful: bool) -> &CourierAccount {
        if takaful {
            &self.takaful
        } else {
            &self.conventional
        }
    }
}

impl Default for CourierConfig {
    fn default() -> Self {
        let shipper = ShipperIdentity {
            name: "Policy Desk".to_string(),
            phone: "02100000000".to_string(),
            address: "Head Office".to_string(),
            city: "Karachi".to_string(),
        };
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout: Duration::from_secs(15),
            conventional: CourierAccount {
                username: String::new(),
                password: String::new(),
                shipper: shipper.clone(),
            },
            takaful: CourierAccount {
                username: String::new(),
                password: String::new(),
                shipper: ShipperIdentity {
                    name: "Takaful Policy Desk".to_string(),
                    ..shipper
                },
            },
        }
    }
}

/// Partner-specific follow-ups after a successful booking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartnerConfig {
    /// Send a WhatsApp template alongside the email/SMS confirmation.
    pub whatsapp_template: Option<String>,

    /// Push a status callback to this upstream URL.
    pub status_callback_url: Option<String>,
}

/// Settings for the courier booking agent's notifications.
///
/// Reads `DOCUMENT_BASE_URL`, `DOCUMENT_LINK_SECRET`,
/// `PARTNER_WHATSAPP_TEMPLATE`, `PARTNER_STATUS_CALLBACK_URL` and
/// `PARTNER_CALLBACK_TIMEOUT_SECS` (default `10`).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub document_base_url: String,
    pub link_secret: String,
    pub partner: PartnerConfig,
    pub callback_timeout: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let optional = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            document_base_url: env_or("DOCUMENT_BASE_URL", &defaults.document_base_url),
            link_secret: env_or("DOCUMENT_LINK_SECRET", &defaults.link_secret),
            partner: PartnerConfig {
                whatsapp_template: optional("PARTNER_WHATSAPP_TEMPLATE"),
                status_callback_url: optional("PARTNER_STATUS_CALLBACK_URL"),
            },
            callback_timeout: Duration::from_secs(env_parse(
                "PARTNER_CALLBACK_TIMEOUT_SECS",
                defaults.callback_timeout.as_secs(),
            )),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            document_base_url: "http://localhost:3000".to_string(),
            link_secret: "change-me".to_string(),
            partner: PartnerConfig::default(),
            callback_timeout: Duration::from_secs(10),
        }
    }
}

/// Outbox worker settings.
///
/// Reads `OUTBOX_POLL_INTERVAL_MS` (default `5000`), `OUTBOX_MAX_ATTEMPTS`
/// (default `3`), `OUTBOX_BASE_BACKOFF_MS` (default `10000`) and
/// `OUTBOX_DISABLED`.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    /// How long a claimed task stays hidden from other workers.
    pub lease: Duration,
    pub batch_size: usize,
    pub enabled: bool,
}

impl OutboxConfig {
    const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);
    const LEASE_SLACK: Duration = Duration::from_secs(30);

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(env_parse(
                "OUTBOX_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            max_attempts: env_parse("OUTBOX_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            base_backoff: Duration::from_millis(env_parse(
                "OUTBOX_BASE_BACKOFF_MS",
                defaults.base_backoff.as_millis() as u64,
            )),
            lease: defaults.lease,
            batch_size: defaults.batch_size,
            enabled: !env_flag("OUTBOX_DISABLED"),
        }
    }

    /// Stretches the lease to cover one booking: a courier request and a
    /// partner callback each running for their whole budget, plus slack for
    /// the store writes. Outbound requests are capped at three times their
    /// timeout. Never shortens the lease.
    pub fn with_lease_covering(
        mut self,
        courier_timeout: Duration,
        callback_timeout: Duration,
    ) -> Self {
        let calls = courier_timeout
            .saturating_add(callback_timeout)
            .saturating_mul(3);
        self.lease = self.lease.max(calls.saturating_add(Self::LEASE_SLACK));
        self
    }

    /// Delay before retrying after the given number of attempts.
    ///
    /// Doubles from `base_backoff` with each attempt, capped at one hour.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(Self::MAX_BACKOFF)
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 3,
            base_backoff: Duration::from_secs(10),
            lease: Duration::from_secs(60),
            batch_size: 10,
            enabled: true,
        }
    }
}
