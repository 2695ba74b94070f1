//! Input guards run before any network activity.

use crate::error::{DclistError, DclistResult};

/// Reject ids that cannot be Discord snowflakes.
///
/// # Errors
/// Returns [`DclistError::InvalidArgument`] unless `id` is 17 to 20 ASCII
/// digits.
pub fn validate_snowflake(id: &str) -> DclistResult<()> {
    if (17..=20).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DclistError::invalid_argument("Invalid Snowflake"))
    }
}

/// Case-insensitive dedupe keeping the first-seen spelling and order.
pub fn dedupe_case_insensitive<'a, I>(items: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: Vec<&'a str> = Vec::new();
    for item in items {
        if !seen.iter().any(|kept| kept.eq_ignore_ascii_case(item)) {
            seen.push(item);
        }
    }
    seen
}
