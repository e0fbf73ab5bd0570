use crate::ToolError;
use chrono::NaiveDate;
use opsdesk_core::clock::parse_date;
use regex::{Regex, RegexBuilder};

/// Enum membership check: `Invalid <field>. Must be one of: a, b`.
pub fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), ToolError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ToolError::InvalidArgs(format!(
            "Invalid {field}. Must be one of: {}",
            allowed.join(", ")
        )))
    }
}

/// [`one_of`] for an optional value; absent passes.
pub fn opt_one_of(field: &str, value: Option<&str>, allowed: &[&str]) -> Result<(), ToolError> {
    value.map_or(Ok(()), |v| one_of(field, v, allowed))
}

pub fn non_negative(field: &str, value: f64) -> Result<(), ToolError> {
    if value < 0.0 {
        return Err(ToolError::InvalidArgs(format!("{field} must be non-negative")));
    }
    Ok(())
}

pub fn positive(field: &str, value: f64) -> Result<(), ToolError> {
    if value <= 0.0 {
        return Err(ToolError::InvalidArgs(format!("{field} must be greater than 0")));
    }
    Ok(())
}

/// Strict `YYYY-MM-DD` date argument.
pub fn date(field: &str, value: &str) -> Result<NaiveDate, ToolError> {
    parse_date(value).ok_or_else(|| {
        ToolError::InvalidArgs(format!("Invalid {field} format. Expected YYYY-MM-DD"))
    })
}

/// Case-insensitive substring matcher for name/title filters.
pub fn contains_ci(needle: &str) -> Result<Regex, ToolError> {
    RegexBuilder::new(&regex::escape(needle.trim()))
        .case_insensitive(true)
        .build()
        .map_err(|e| ToolError::InvalidArgs(format!("Invalid search text: {e}")))
}

/// Timestamp/date filter: the stored value starts with the requested prefix.
pub fn prefix_match(stored: Option<&str>, wanted: &str) -> bool {
    stored.is_some_and(|s| s.starts_with(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_error_lists_choices() {
        let err = one_of("status", "paused", &["active", "inactive"]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid status. Must be one of: active, inactive");
        assert!(opt_one_of("status", None, &["active"]).is_ok());
    }

    #[test]
    fn amounts() {
        assert!(non_negative("hours_worked", 0.0).is_ok());
        assert!(non_negative("hours_worked", -1.0).is_err());
        assert_eq!(
            positive("amount", 0.0).unwrap_err().to_string(),
            "amount must be greater than 0"
        );
    }

    #[test]
    fn partial_match_escapes_and_ignores_case() {
        let re = contains_ci("R&D (east)").expect("regex");
        assert!(re.is_match("Global r&d (East) team"));
        assert!(!re.is_match("R&D west"));
    }

    #[test]
    fn prefix_filters() {
        assert!(prefix_match(Some("2025-11-16T23:59:00"), "2025-11"));
        assert!(!prefix_match(None, "2025"));
    }
}
