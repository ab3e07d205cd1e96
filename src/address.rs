//! Email address type with optional display name.

use crate::error::DispatchError;
use email_address::EmailAddress;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// An email address with an optional display name.
///
/// In JSON an address is accepted either as a bare string or as an object:
///
/// ```
/// use hermes::Address;
///
/// let bare: Address = serde_json::from_str(r#""user@example.com""#).unwrap();
/// assert_eq!(bare.email, "user@example.com");
/// assert_eq!(bare.name, None);
///
/// let named: Address =
///     serde_json::from_str(r#"{"name": "Alice", "email": "alice@example.com"}"#).unwrap();
/// assert_eq!(named.name, Some("Alice".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    /// Optional display name (e.g., "Alice Smith")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address (e.g., "alice@example.com")
    pub email: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Bare(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        email: String,
    },
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match AddressRepr::deserialize(deserializer)? {
            AddressRepr::Bare(email) => Self { name: None, email },
            AddressRepr::Full { name, email } => Self { name, email },
        })
    }
}

impl Address {
    /// Create a new address with just an email.
    ///
    /// No validation happens here; submissions are checked with
    /// [`Address::validate`] before they are queued.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new address with a name and email.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse and validate an email address.
    ///
    /// ```
    /// use hermes::Address;
    ///
    /// assert!(Address::parse("user@example.com").is_ok());
    /// assert!(Address::parse("not-an-email").is_err());
    /// assert!(Address::parse("").is_err());
    /// ```
    pub fn parse(email: &str) -> Result<Self, DispatchError> {
        let addr = Self::new(email);
        addr.validate()?;
        Ok(addr)
    }

    /// Check the email part against RFC 5321/5322.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if !EmailAddress::is_valid(&self.email) {
            return Err(DispatchError::Validation(format!(
                "'{}' is not a valid email address",
                self.email
            )));
        }
        Ok(())
    }

    /// Convert the domain part of the email address to ASCII (Punycode).
    ///
    /// The local part (before @) is preserved as-is.
    ///
    /// ```
    /// use hermes::Address;
    ///
    /// let addr = Address::new("user@例え.jp");
    /// assert_eq!(addr.to_ascii().unwrap(), "user@xn--r8jz45g.jp");
    /// ```
    pub fn to_ascii(&self) -> Result<String, DispatchError> {
        let Some((local_part, domain)) = self.email.split_once('@') else {
            return Err(DispatchError::Validation(format!(
                "'{}' is missing @ symbol",
                self.email
            )));
        };

        let ascii_domain = idna::domain_to_ascii(domain).map_err(|e| {
            DispatchError::Validation(format!(
                "Failed to convert domain '{}' to ASCII: {:?}",
                domain, e
            ))
        })?;

        Ok(format!("{}@{}", local_part, ascii_domain))
    }

    /// Format as `"Name" <email>` or just `email` if no name.
    ///
    /// Backslashes and double quotes in the name are escaped. This is the
    /// form handed to the provider.
    pub fn formatted_rfc5322(&self) -> String {
        quote_display(self.name.as_deref(), &self.email)
    }

    /// Like [`Address::formatted_rfc5322`] with the domain converted to Punycode.
    pub fn formatted_rfc5322_ascii(&self) -> Result<String, DispatchError> {
        let ascii_email = self.to_ascii()?;
        Ok(quote_display(self.name.as_deref(), &ascii_email))
    }
}

fn quote_display(name: Option<&str>, email: &str) -> String {
    match name {
        Some(name) if !name.is_empty() => {
            // Escape backslashes first, then quotes
            let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{}\" <{}>", escaped, email)
        }
        _ => email.to_string(),
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted_rfc5322())
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

impl From<(&str, &str)> for Address {
    fn from((name, email): (&str, &str)) -> Self {
        Self::with_name(name, email)
    }
}

impl From<(String, String)> for Address {
    fn from((name, email): (String, String)) -> Self {
        Self::with_name(name, email)
    }
}

/// Trait for types that can be converted to an email address.
///
/// Implement this for your own user/contact types to pass them straight to
/// the [`Email`](crate::Email) builder.
pub trait ToAddress {
    fn to_address(&self) -> Address;
}

impl<T: ToAddress + ?Sized> ToAddress for &T {
    fn to_address(&self) -> Address {
        (*self).to_address()
    }
}

impl ToAddress for Address {
    fn to_address(&self) -> Address {
        self.clone()
    }
}

impl ToAddress for str {
    fn to_address(&self) -> Address {
        Address::new(self)
    }
}

impl ToAddress for String {
    fn to_address(&self) -> Address {
        Address::new(self)
    }
}

impl<N: AsRef<str>, E: AsRef<str>> ToAddress for (N, E) {
    fn to_address(&self) -> Address {
        Address::with_name(self.0.as_ref(), self.1.as_ref())
    }
}
