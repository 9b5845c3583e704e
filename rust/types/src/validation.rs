//! Name and metadata validation shared by collection and database creation.
//! Plain string checks rather than a regex crate: the grammar is small
//! enough (3-512 chars, `[a-zA-Z0-9._-]`, no `..`, not bare-IP) that a regex
//! engine is more machinery than the rule needs.

use crate::error::CatalogError;
use crate::metadata::Metadata;
use std::net::IpAddr;
use std::str::FromStr;

pub fn validate_name(name: &str) -> Result<(), CatalogError> {
    let len = name.chars().count();
    if !(3..=512).contains(&len)
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        || !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        || !name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return Err(CatalogError::Internal(format!(
            "expected a name with 3-512 characters from [a-zA-Z0-9._-], starting and ending \
             with a character in [a-zA-Z0-9], got: {name}"
        )));
    }

    if name.contains("..") {
        return Err(CatalogError::Internal(format!(
            "expected a name that does not contain two consecutive periods (..), got: {name}"
        )));
    }

    if IpAddr::from_str(name).is_ok() {
        return Err(CatalogError::Internal(format!(
            "expected a name that is not a valid ip address, got: {name}"
        )));
    }

    Ok(())
}

pub fn validate_non_empty_metadata(metadata: &Metadata) -> Result<(), CatalogError> {
    if metadata.is_empty() {
        Err(CatalogError::InvalidMetadataUpdate)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;

    #[test]
    fn rejects_names_with_double_periods() {
        assert!(validate_name("foo..bar").is_err());
    }

    #[test]
    fn rejects_names_that_are_ip_addresses() {
        assert!(validate_name("192.168.0.1").is_err());
    }

    #[test]
    fn rejects_too_short_names() {
        assert!(validate_name("ab").is_err());
    }

    #[test]
    fn accepts_a_normal_name() {
        assert!(validate_name("my-collection_01").is_ok());
    }

    #[test]
    fn rejects_empty_metadata() {
        assert!(validate_non_empty_metadata(&Metadata::new()).is_err());
    }

    #[test]
    fn accepts_nonempty_metadata() {
        let mut m = Metadata::new();
        m.insert("k".to_string(), MetadataValue::Bool(true));
        assert!(validate_non_empty_metadata(&m).is_ok());
    }
}
