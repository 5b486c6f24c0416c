use serde::Serialize;

/// Threshold ladder used when the profile text has no usable value.
pub const DEFAULT_THRESHOLDS: [u32; 3] = [80, 90, 100];

pub const DEFAULT_THRESHOLDS_TEXT: &str = "80, 90, 100";

/// Largest percentage accepted as an alert threshold.
pub const MAX_THRESHOLD: u32 = 500;

/// Financial settings attached one-to-one to a user.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub currency: String,
    pub fixed_income_cents: i64,
    pub fixed_investment_cents: i64,
    pub soft_cap_cents: Option<i64>,
    pub hard_cap_cents: Option<i64>,
    pub alerts_enabled: bool,
    pub alert_thresholds: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    pub fn threshold_list(&self) -> Vec<u32> {
        parse_thresholds(&self.alert_thresholds)
    }

    /// Onboarding is complete once a fixed income has been entered.
    pub fn needs_onboarding(&self) -> bool {
        self.fixed_income_cents <= 0
    }
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub currency: String,
    pub fixed_income_cents: i64,
    pub fixed_investment_cents: i64,
    pub soft_cap_cents: Option<i64>,
    pub hard_cap_cents: Option<i64>,
    pub alerts_enabled: bool,
    pub alert_thresholds: String,
}

impl From<&Profile> for ProfileUpdate {
    fn from(p: &Profile) -> Self {
        Self {
            currency: p.currency.clone(),
            fixed_income_cents: p.fixed_income_cents,
            fixed_investment_cents: p.fixed_investment_cents,
            soft_cap_cents: p.soft_cap_cents,
            hard_cap_cents: p.hard_cap_cents,
            alerts_enabled: p.alerts_enabled,
            alert_thresholds: p.alert_thresholds.clone(),
        }
    }
}

/// Lenient parse of the free-text ladder: non-numeric parts are ignored,
/// the result is sorted and de-duplicated, and an empty result falls back to
/// [`DEFAULT_THRESHOLDS`].
pub fn parse_thresholds(text: &str) -> Vec<u32> {
    let mut values: Vec<u32> = text
        .split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .collect();
    values.sort_unstable();
    values.dedup();

    if values.is_empty() {
        DEFAULT_THRESHOLDS.to_vec()
    } else {
        values
    }
}

/// Strict parse used by the settings form. Returns the normalized text.
pub fn validate_thresholds(text: &str) -> Result<String, String> {
    let mut values = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let value: u32 = part
            .parse()
            .map_err(|_| format!("\"{}\" não é um número inteiro.", part))?;
        if value == 0 || value > MAX_THRESHOLD {
            return Err(format!(
                "Os limites devem estar entre 1 e {}.",
                MAX_THRESHOLD
            ));
        }
        values.push(value);
    }
    if values.is_empty() {
        return Err("Informe pelo menos um limite de alerta.".into());
    }
    values.sort_unstable();
    values.dedup();
    Ok(values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thresholds_sorts_and_ignores_garbage() {
        assert_eq!(parse_thresholds("100, 50, abc, 75"), vec![50, 75, 100]);
        assert_eq!(parse_thresholds("90,90, 80"), vec![80, 90]);
    }

    #[test]
    fn test_parse_thresholds_fallback() {
        assert_eq!(parse_thresholds(""), vec![80, 90, 100]);
        assert_eq!(parse_thresholds("x, y"), vec![80, 90, 100]);
    }

    #[test]
    fn test_validate_thresholds() {
        assert_eq!(validate_thresholds(" 90, 50 ,75").unwrap(), "50, 75, 90");
        assert!(validate_thresholds("50, abc").is_err());
        assert!(validate_thresholds("0").is_err());
        assert!(validate_thresholds("").is_err());
    }
}
