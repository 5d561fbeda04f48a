//! Context addresses
//!
//! An [`Address`] names an execution context: its [`ContextKind`], up to two
//! numeric locators (tab and frame for tab-scoped kinds) and an optional
//! instance name. The canonical string form is
//!
//! ```text
//! <kind>[@<primary>[.<secondary>]][#<instance>]
//! ```
//!
//! e.g. `background`, `content-script@12`, `content-script@12.3`,
//! `devtools@12`, `popup#settings`. Formatting and parsing are exact inverses
//! over valid addresses, so two addresses are equal iff their strings are.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AddressFormatError;

/// The kind of execution context an address names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextKind {
    /// The privileged hub every other context can reach
    Background,
    /// Per-tab agent injected into a page
    ContentScript,
    /// Extension popup page
    Popup,
    /// Extension options page
    Options,
    /// Devtools page bound to an inspected tab
    Devtools,
    /// Frame embedded in a page or an extension page
    #[serde(rename = "iframe")]
    Frame,
    /// Script running in the page's own window
    Window,
}

impl ContextKind {
    /// All kinds, in declaration order
    pub const ALL: [ContextKind; 7] = [
        ContextKind::Background,
        ContextKind::ContentScript,
        ContextKind::Popup,
        ContextKind::Options,
        ContextKind::Devtools,
        ContextKind::Frame,
        ContextKind::Window,
    ];

    /// Canonical name used in addresses and hop tags
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::Background => "background",
            ContextKind::ContentScript => "content-script",
            ContextKind::Popup => "popup",
            ContextKind::Options => "options",
            ContextKind::Devtools => "devtools",
            ContextKind::Frame => "iframe",
            ContextKind::Window => "window",
        }
    }

    /// The routing hub
    pub fn is_hub(self) -> bool {
        self == ContextKind::Background
    }

    /// Extension pages; these can host frames and forward on their behalf
    pub fn is_extension_page(self) -> bool {
        matches!(
            self,
            ContextKind::Popup | ContextKind::Options | ContextKind::Devtools
        )
    }

    /// Contexts living inside a page, reachable only through a forwarder
    pub fn is_page_context(self) -> bool {
        matches!(self, ContextKind::Window | ContextKind::Frame)
    }

    /// Kinds whose addresses carry tab/frame locators
    pub fn is_tab_scoped(self) -> bool {
        matches!(
            self,
            ContextKind::ContentScript
                | ContextKind::Devtools
                | ContextKind::Window
                | ContextKind::Frame
        )
    }

    /// Kinds that cannot be addressed without a tab locator from outside a tab.
    ///
    /// Frames are excluded: an extension page addresses its own embedded frame
    /// without any locator.
    pub fn requires_tab_locator(self) -> bool {
        matches!(
            self,
            ContextKind::ContentScript | ContextKind::Devtools | ContextKind::Window
        )
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKind {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContextKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AddressFormatError::UnknownKind(s.to_string()))
    }
}

/// Identifies one execution context.
///
/// Invariants: a secondary locator is only present together with a primary
/// one, and an instance name is never empty nor contains whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    kind: ContextKind,
    primary: Option<u32>,
    secondary: Option<u32>,
    instance: Option<String>,
}

impl Address {
    /// Unqualified address of `kind`
    pub fn new(kind: ContextKind) -> Self {
        Self {
            kind,
            primary: None,
            secondary: None,
            instance: None,
        }
    }

    /// The hub address
    pub fn hub() -> Self {
        Self::new(ContextKind::Background)
    }

    /// Address qualified by a tab and optionally a frame
    pub fn in_tab(kind: ContextKind, tab: u32, frame: Option<u32>) -> Self {
        Self {
            kind,
            primary: Some(tab),
            secondary: frame,
            instance: None,
        }
    }

    /// Attach an instance name
    pub fn with_instance(mut self, name: impl Into<String>) -> Result<Self, AddressFormatError> {
        let name = name.into();
        validate_instance(&name)?;
        self.instance = Some(name);
        Ok(self)
    }

    /// Replace both locators; a secondary without a primary is dropped
    pub fn with_locators(mut self, primary: Option<u32>, secondary: Option<u32>) -> Self {
        self.primary = primary;
        self.secondary = primary.and(secondary);
        self
    }

    /// Replace the kind, keeping locators and instance
    pub fn with_kind(mut self, kind: ContextKind) -> Self {
        self.kind = kind;
        self
    }

    /// Context kind
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Primary locator (tab)
    pub fn primary(&self) -> Option<u32> {
        self.primary
    }

    /// Secondary locator (frame)
    pub fn secondary(&self) -> Option<u32> {
        self.secondary
    }

    /// Instance name
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Whether any locator is present
    pub fn is_qualified(&self) -> bool {
        self.primary.is_some()
    }

    /// The same address with both locators stripped
    pub fn unqualified(&self) -> Self {
        self.clone().with_locators(None, None)
    }

    /// Render the canonical string form
    pub fn format(&self) -> String {
        self.to_string()
    }

    /// Parse the canonical string form
    pub fn parse(s: &str) -> Result<Self, AddressFormatError> {
        s.parse()
    }
}

fn validate_instance(name: &str) -> Result<(), AddressFormatError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(AddressFormatError::InvalidInstance(name.to_string()));
    }
    Ok(())
}

/// Canonical decimal only: no sign, no leading zeros
fn parse_locator(address: &str, locator: &str) -> Result<u32, AddressFormatError> {
    let canonical = !locator.is_empty()
        && locator.bytes().all(|b| b.is_ascii_digit())
        && (locator == "0" || !locator.starts_with('0'));

    canonical
        .then(|| locator.parse::<u32>().ok())
        .flatten()
        .ok_or_else(|| AddressFormatError::InvalidLocator {
            address: address.to_string(),
            locator: locator.to_string(),
        })
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if let Some(primary) = self.primary {
            write!(f, "@{primary}")?;
            if let Some(secondary) = self.secondary {
                write!(f, ".{secondary}")?;
            }
        }
        if let Some(instance) = &self.instance {
            write!(f, "#{instance}")?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AddressFormatError::Empty);
        }

        let (head, instance) = match s.split_once('#') {
            Some((head, instance)) => {
                validate_instance(instance)?;
                (head, Some(instance.to_string()))
            }
            None => (s, None),
        };

        let (kind, locators) = match head.split_once('@') {
            Some((kind, locators)) => (kind, Some(locators)),
            None => (head, None),
        };
        let kind: ContextKind = kind.parse()?;

        let (primary, secondary) = match locators {
            None => (None, None),
            Some(locators) => match locators.split_once('.') {
                Some((primary, secondary)) => (
                    Some(parse_locator(s, primary)?),
                    Some(parse_locator(s, secondary)?),
                ),
                None => (Some(parse_locator(s, locators)?), None),
            },
        };

        Ok(Self {
            kind,
            primary,
            secondary,
            instance,
        })
    }
}

impl TryFrom<String> for Address {
    type Error = AddressFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl From<ContextKind> for Address {
    fn from(kind: ContextKind) -> Self {
        Address::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_examples() {
        assert_eq!(Address::hub().to_string(), "background");
        assert_eq!(
            Address::in_tab(ContextKind::ContentScript, 12, None).to_string(),
            "content-script@12"
        );
        assert_eq!(
            Address::in_tab(ContextKind::ContentScript, 12, Some(3)).to_string(),
            "content-script@12.3"
        );
        let named = Address::new(ContextKind::Popup)
            .with_instance("settings")
            .unwrap();
        assert_eq!(named.to_string(), "popup#settings");
    }

    #[test]
    fn test_parse_examples() {
        let addr: Address = "devtools@7".parse().unwrap();
        assert_eq!(addr.kind(), ContextKind::Devtools);
        assert_eq!(addr.primary(), Some(7));
        assert_eq!(addr.secondary(), None);

        let addr: Address = "iframe@4.0#inner".parse().unwrap();
        assert_eq!(addr.kind(), ContextKind::Frame);
        assert_eq!(addr.secondary(), Some(0));
        assert_eq!(addr.instance(), Some("inner"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(Address::parse(""), Err(AddressFormatError::Empty));
        assert!(matches!(
            Address::parse("sidebar"),
            Err(AddressFormatError::UnknownKind(_))
        ));
        for bad in [
            "content-script@",
            "content-script@x",
            "content-script@+5",
            "content-script@05",
            "content-script@5.",
            "content-script@.5",
            "content-script@99999999999",
        ] {
            assert!(
                matches!(Address::parse(bad), Err(AddressFormatError::InvalidLocator { .. })),
                "{bad} should be rejected"
            );
        }
        assert!(matches!(
            Address::parse("popup#"),
            Err(AddressFormatError::InvalidInstance(_))
        ));
    }

    #[test]
    fn test_with_locators_drops_dangling_secondary() {
        let addr = Address::new(ContextKind::Frame).with_locators(None, Some(3));
        assert_eq!(addr.secondary(), None);
        assert_eq!(addr.to_string(), "iframe");
    }

    #[test]
    fn test_unqualified_keeps_kind_and_instance() {
        let addr = Address::in_tab(ContextKind::Window, 1, Some(2))
            .with_instance("w")
            .unwrap();
        assert_eq!(addr.unqualified().to_string(), "window#w");
    }

    #[test]
    fn test_serde_uses_string_form() {
        let addr = Address::in_tab(ContextKind::ContentScript, 3, Some(1));
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"content-script@3.1\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<Address>("\"nowhere@1\"").is_err());
    }

    #[test]
    fn test_kind_classification() {
        assert!(ContextKind::Popup.is_extension_page());
        assert!(!ContextKind::Frame.is_extension_page());
        assert!(ContextKind::Frame.is_page_context());
        assert!(ContextKind::Devtools.is_tab_scoped());
        assert!(!ContextKind::Frame.requires_tab_locator());
        assert!(ContextKind::Background.is_hub());
    }
}
