//! Reading the few device-set attributes the launcher cares about.
//!
//! A device set is a `PlusConfiguration` document. Its direct
//! `PlusOpenIGTLinkServer` children declare the endpoints the server will
//! open once started.

use std::fmt;

use roxmltree::Document;

use crate::{Error, Result};

pub const ROOT_ELEMENT: &str = "PlusConfiguration";
pub const DEVICE_SET_ELEMENT: &str = "DeviceSet";
pub const SERVER_ELEMENT: &str = "PlusOpenIGTLinkServer";
pub const CHANNEL_ATTRIBUTE: &str = "OutputChannelId";
pub const PORT_ATTRIBUTE: &str = "ListeningPort";

/// One declared server endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub name: String,
    pub port: String,
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// Endpoints declared directly under the document root, in document order.
/// Declarations without a port are skipped.
///
/// # Errors
///
/// Returns `Error::Xml` if the document is not well-formed.
pub fn discover_endpoints(xml: &str) -> Result<Vec<ServerEndpoint>> {
    let doc = Document::parse(xml)?;
    Ok(doc
        .root_element()
        .children()
        .filter(|node| node.has_tag_name(SERVER_ELEMENT))
        .filter_map(|node| {
            let port = node.attribute(PORT_ATTRIBUTE)?;
            let name = node.attribute(CHANNEL_ATTRIBUTE).unwrap_or(SERVER_ELEMENT);
            Some(ServerEndpoint {
                name: name.to_string(),
                port: port.to_string(),
            })
        })
        .collect())
}

/// `name:port` pairs joined by `;`.
#[must_use]
pub fn format_endpoints(endpoints: &[ServerEndpoint]) -> String {
    endpoints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

/// Name and description of a device set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSetSummary {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl DeviceSetSummary {
    /// Read the first `DeviceSet` element of a `PlusConfiguration` document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Xml` for malformed XML and `Error::Config` when the
    /// root element is not `PlusConfiguration`.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if !root.tag_name().name().eq_ignore_ascii_case(ROOT_ELEMENT) {
            return Err(Error::Config(format!(
                "unexpected root element <{}>, expected <{ROOT_ELEMENT}>",
                root.tag_name().name()
            )));
        }

        let Some(device_set) = root
            .descendants()
            .find(|node| node.has_tag_name(DEVICE_SET_ELEMENT))
        else {
            return Ok(Self::default());
        };

        Ok(Self {
            name: device_set.attribute("Name").map(str::to_string),
            description: device_set.attribute("Description").map(str::to_string),
        })
    }

    /// Name for log lines, falling back to the file name.
    #[must_use]
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(fallback)
    }
}
