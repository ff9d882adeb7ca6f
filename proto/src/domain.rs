use serde::{Deserialize, Serialize};

/// First element of a query-cache key, e.g. `["orders", {page: 2}]` lives in the `orders` domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheDomain {
    Orders,
    Dashboard,
    FinancialDocuments,
    FinancialSummary,
    RealtimeEvents,
    EventLogs,
    SystemLogs,
}

impl CacheDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDomain::Orders => "orders",
            CacheDomain::Dashboard => "dashboard",
            CacheDomain::FinancialDocuments => "financial-documents",
            CacheDomain::FinancialSummary => "financial-summary",
            CacheDomain::RealtimeEvents => "realtime-events",
            CacheDomain::EventLogs => "event-logs",
            CacheDomain::SystemLogs => "system-logs",
        }
    }
}

impl AsRef<str> for CacheDomain {
    fn as_ref(&self) -> &str { self.as_str() }
}

impl std::fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.as_str()) }
}
