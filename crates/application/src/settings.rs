use chrono::Duration;
use domain::seo::SiteContext;
use serde::Serialize;

/// Where buyers send their bank transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
}

/// Runtime settings shared by the services.
#[derive(Debug, Clone)]
pub struct Settings {
    pub site: SiteContext,
    /// How long a payment attempt stays payable.
    pub payment_window: Duration,
    /// How long an idempotent response is kept for replay.
    pub idempotency_ttl: Duration,
    pub bank: BankDetails,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site: SiteContext::new("Academy", "http://localhost:3000", "USD"),
            payment_window: Duration::hours(72),
            idempotency_ttl: Duration::hours(24),
            bank: BankDetails {
                bank_name: "Example Bank".to_string(),
                account_name: "Academy Ltd".to_string(),
                account_number: "000-000000-0".to_string(),
            },
        }
    }
}
