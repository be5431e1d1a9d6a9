//! Event payloads shared by every delivery of one event
//!
//! A payload is built once per `notify` call and handed to each queued
//! notification behind an `Arc`. Its buffers are freed when the last
//! notification holding it completes or is pruned.

use std::fmt::Write;

const PROPERTYSET_OPEN: &str = "<e:propertyset xmlns:e=\"urn:schemas-upnp-org:event-1-0\">\n";
const PROPERTYSET_CLOSE: &str = "</e:propertyset>\n\n";

/// Headers and body of one event, plus the service it was raised on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPayload {
    udn: String,
    service_id: String,
    headers: Vec<(String, String)>,
    property_set: String,
}

impl NotifyPayload {
    /// Wrap an already serialized property set
    pub fn new(
        udn: impl Into<String>,
        service_id: impl Into<String>,
        property_set: impl Into<String>,
    ) -> Self {
        let property_set = property_set.into();
        let headers = vec![
            (
                "CONTENT-TYPE".to_string(),
                "text/xml; charset=\"utf-8\"".to_string(),
            ),
            ("CONTENT-LENGTH".to_string(), property_set.len().to_string()),
            ("NT".to_string(), "upnp:event".to_string()),
            ("NTS".to_string(), "upnp:propchange".to_string()),
        ];

        Self {
            udn: udn.into(),
            service_id: service_id.into(),
            headers,
            property_set,
        }
    }

    /// Build the property set from evented variable names and values
    pub fn from_variables<N, V>(
        udn: impl Into<String>,
        service_id: impl Into<String>,
        variables: &[(N, V)],
    ) -> Self
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        Self::new(udn, service_id, property_set(variables))
    }

    pub fn udn(&self) -> &str {
        &self.udn
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// GENA headers, without the per-subscription `SID` and `SEQ`
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn property_set(&self) -> &str {
        &self.property_set
    }

    /// Headers rendered as CRLF terminated lines
    pub fn header_block(&self) -> String {
        self.headers.iter().fold(String::new(), |mut block, (name, value)| {
            let _ = write!(block, "{}: {}\r\n", name, value);
            block
        })
    }
}

/// Serialize evented variables as a GENA `<e:propertyset>` document
pub fn property_set<N, V>(variables: &[(N, V)]) -> String
where
    N: AsRef<str>,
    V: AsRef<str>,
{
    let mut xml = String::from(PROPERTYSET_OPEN);
    for (name, value) in variables {
        let name = name.as_ref();
        let _ = write!(
            xml,
            "<e:property>\n<{name}>{value}</{name}>\n</e:property>\n",
            name = name,
            value = escape_text(value.as_ref())
        );
    }
    xml.push_str(PROPERTYSET_CLOSE);
    xml
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
