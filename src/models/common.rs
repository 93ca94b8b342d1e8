use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// Plan as mirrored onto the user record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    #[default]
    None,
    Monthly,
    Annual,
}

/// Billing interval of a subscription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum BillingInterval {
    Month,
    Annual,
}

impl BillingInterval {
    /// Anything that is not a monthly interval bills annually.
    pub fn from_billing(interval: &str) -> Self {
        if interval.eq_ignore_ascii_case("month") {
            BillingInterval::Month
        } else {
            BillingInterval::Annual
        }
    }

    pub fn plan(&self) -> SubscriptionPlan {
        match self {
            BillingInterval::Month => SubscriptionPlan::Monthly,
            BillingInterval::Annual => SubscriptionPlan::Annual,
        }
    }
}

impl From<String> for BillingInterval {
    fn from(interval: String) -> Self {
        Self::from_billing(&interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_to_plan() {
        assert_eq!(BillingInterval::Month.plan(), SubscriptionPlan::Monthly);
        assert_eq!(BillingInterval::Annual.plan(), SubscriptionPlan::Annual);
        assert_eq!(BillingInterval::from_billing("MONTH"), BillingInterval::Month);
        assert_eq!(BillingInterval::from_billing("year"), BillingInterval::Annual);
        assert_eq!(BillingInterval::from_billing("week"), BillingInterval::Annual);
    }

    #[test]
    fn test_stored_intervals_are_read_leniently() {
        let month: BillingInterval = serde_json::from_str("\"month\"").unwrap();
        let year: BillingInterval = serde_json::from_str("\"year\"").unwrap();
        assert_eq!(month, BillingInterval::Month);
        assert_eq!(year, BillingInterval::Annual);
        assert_eq!(serde_json::to_string(&BillingInterval::Annual).unwrap(), "\"annual\"");
    }

    #[test]
    fn test_plan_serialization() {
        assert_eq!(serde_json::to_string(&SubscriptionPlan::None).unwrap(), "\"none\"");
        assert_eq!(serde_json::to_string(&SubscriptionPlan::Monthly).unwrap(), "\"monthly\"");
    }
}
