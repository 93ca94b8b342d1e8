use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub code: String,
    pub kind: DiscountKind,
    /// Percentage points, or currency minor units for fixed discounts.
    pub value: Decimal,
    pub usage_limit: Option<u32>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Promotion {
    pub fn new(code: &str, kind: DiscountKind, value: Decimal, expires_at: DateTime<Utc>) -> Self {
        Self {
            code: code.to_string(),
            kind,
            value,
            usage_limit: None,
            expires_at,
            description: None,
        }
    }

    pub fn describe(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match self.kind {
            DiscountKind::Percentage => format!("{}% rabatt", self.value.normalize()),
            DiscountKind::Fixed => format!("{} kr rabatt", minor_to_major(self.value).normalize()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    NotFound,
    Expired,
}

impl RejectionReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::NotFound => "Ogiltig rabattkod",
            RejectionReason::Expired => "Rabattkoden har gått ut",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::NotFound => write!(f, "code not found"),
            RejectionReason::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscountResult {
    Valid {
        code: String,
        kind: DiscountKind,
        value: Decimal,
        description: String,
    },
    Invalid(RejectionReason),
}

impl DiscountResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, DiscountResult::Valid { .. })
    }

    /// Price after the discount, in major currency units. Never negative.
    pub fn apply_to(&self, price: Decimal) -> Decimal {
        let discounted = match self {
            DiscountResult::Valid { kind: DiscountKind::Percentage, value, .. } => {
                price - price * *value / Decimal::ONE_HUNDRED
            }
            DiscountResult::Valid { kind: DiscountKind::Fixed, value, .. } => {
                price - minor_to_major(*value)
            }
            DiscountResult::Invalid(_) => price,
        };
        discounted.max(Decimal::ZERO).round_dp(2)
    }

    /// `price` is the checkout price in major units, when the client sent one.
    pub fn to_response(&self, price: Option<Decimal>) -> ValidateDiscountResponse {
        match self {
            DiscountResult::Valid { code, kind, value, description } => ValidateDiscountResponse {
                valid: true,
                code: Some(code.clone()),
                kind: Some(*kind),
                value: Some(*value),
                description: Some(description.clone()),
                discounted_price: price.map(|price| self.apply_to(price)),
                message: None,
            },
            DiscountResult::Invalid(reason) => ValidateDiscountResponse {
                valid: false,
                code: None,
                kind: None,
                value: None,
                description: None,
                discounted_price: None,
                message: Some(reason.message().to_string()),
            },
        }
    }
}

fn minor_to_major(value: Decimal) -> Decimal {
    value / Decimal::ONE_HUNDRED
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateDiscountRequest {
    #[validate(required(message = "Rabattkod saknas"), custom = "validate_not_blank")]
    pub code: Option<String>,
    #[serde(default)]
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
}

fn validate_not_blank(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("Rabattkod saknas".into());
        return Err(error);
    }
    Ok(())
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        let mut error = ValidationError::new("negative");
        error.message = Some("Priset kan inte vara negativt".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateDiscountResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<DiscountKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid(kind: DiscountKind, value: i64) -> DiscountResult {
        DiscountResult::Valid {
            code: "X".to_string(),
            kind,
            value: Decimal::new(value, 0),
            description: String::new(),
        }
    }

    #[test]
    fn test_percentage_discount_applies() {
        let price = Decimal::new(49900, 2);
        assert_eq!(valid(DiscountKind::Percentage, 10).apply_to(price), Decimal::new(44910, 2));
    }

    #[test]
    fn test_fixed_discount_never_goes_negative() {
        let price = Decimal::new(2000, 2);
        assert_eq!(valid(DiscountKind::Fixed, 5000).apply_to(price), Decimal::ZERO);
        assert_eq!(valid(DiscountKind::Fixed, 500).apply_to(price), Decimal::new(1500, 2));
    }

    #[test]
    fn test_invalid_result_keeps_price() {
        let price = Decimal::new(9900, 2);
        assert_eq!(DiscountResult::Invalid(RejectionReason::Expired).apply_to(price), price);
    }

    #[test]
    fn test_describe_defaults() {
        let expires = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let pct = Promotion::new("WELCOME10", DiscountKind::Percentage, Decimal::new(10, 0), expires);
        assert_eq!(pct.describe(), "10% rabatt");

        let fixed = Promotion::new("SAVE50", DiscountKind::Fixed, Decimal::new(5000, 0), expires);
        assert_eq!(fixed.describe(), "50 kr rabatt");
    }

    #[test]
    fn test_request_validation() {
        let missing = ValidateDiscountRequest { code: None, price: None };
        assert!(missing.validate().is_err());

        let blank = ValidateDiscountRequest { code: Some("   ".to_string()), price: None };
        assert!(blank.validate().is_err());

        let negative = ValidateDiscountRequest { code: Some("welcome10".to_string()), price: Some(Decimal::new(-1, 0)) };
        assert!(negative.validate().is_err());

        let ok = ValidateDiscountRequest { code: Some("welcome10".to_string()), price: Some(Decimal::new(49900, 2)) };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_invalid_response_shape() {
        let body = serde_json::to_value(DiscountResult::Invalid(RejectionReason::NotFound).to_response(Some(Decimal::ONE_HUNDRED))).unwrap();
        assert_eq!(body["valid"], false);
        assert_eq!(body["message"], "Ogiltig rabattkod");
        assert!(body.get("code").is_none());
        assert!(body.get("discountedPrice").is_none());
    }

    #[test]
    fn test_valid_response_carries_discounted_price() {
        let result = valid(DiscountKind::Percentage, 10);
        let body = serde_json::to_value(result.to_response(Some(Decimal::new(49900, 2)))).unwrap();
        assert_eq!(body["valid"], true);
        assert_eq!(body["type"], "percentage");
        assert_eq!(body["discountedPrice"], 449.1);

        let without_price = serde_json::to_value(result.to_response(None)).unwrap();
        assert!(without_price.get("discountedPrice").is_none());
    }
}
