//! Reading protocol objects out of SAML XML.
//!
//! Only the facts the validator needs are read. Anything that cannot be
//! read is recorded in [`SamlResponse::library_errors`] instead of failing
//! the whole parse, so the validator still reports every problem at once.

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};

use super::types::{
    escape_attr, Assertion, Attribute, Conditions, EncryptedAssertion, EncryptedId, NameId,
    SamlResponse, Status, Subject, SubjectConfirmation,
};

pub const PROTOCOL_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

impl SamlResponse {
    /// Parse the first `<samlp:Response>` found in `xml`, which may be a
    /// bare response or one wrapped in a SOAP/ArtifactResponse envelope.
    pub fn from_xml(xml: &str) -> Result<Self, String> {
        let doc = Document::parse(xml).map_err(|e| format!("Failed to parse XML: {}", e))?;
        let node = doc
            .descendants()
            .find(|n| n.has_tag_name((PROTOCOL_NS, "Response")))
            .ok_or_else(|| "No samlp:Response element found".to_string())?;
        Ok(read_response(node, xml))
    }

    /// Parse a decrypted assertion and append it to the response.
    pub fn push_assertion_xml(&mut self, xml: &str) -> Result<(), String> {
        let doc = Document::parse(xml).map_err(|e| format!("Failed to parse XML: {}", e))?;
        let node = doc
            .descendants()
            .find(|n| n.has_tag_name((ASSERTION_NS, "Assertion")))
            .ok_or_else(|| "No saml:Assertion element found".to_string())?;
        let mut errors = Vec::new();
        self.assertions.push(read_assertion(node, xml, &mut errors));
        self.library_errors.extend(errors);
        Ok(())
    }
}

/// Read the status carried directly by a protocol message element.
pub(crate) fn read_status(message: Node) -> Option<Status> {
    let status = saml_child(message, PROTOCOL_NS, "Status")?;
    let code = saml_child(status, PROTOCOL_NS, "StatusCode");
    Some(Status {
        code: code
            .and_then(|c| c.attribute("Value"))
            .unwrap_or_default()
            .to_string(),
        sub_code: code
            .and_then(|c| saml_child(c, PROTOCOL_NS, "StatusCode"))
            .and_then(|c| c.attribute("Value"))
            .map(str::to_string),
        message: saml_child(status, PROTOCOL_NS, "StatusMessage").and_then(text),
    })
}

pub(crate) fn read_response(node: Node, xml: &str) -> SamlResponse {
    let mut errors = Vec::new();

    let status = read_status(node).unwrap_or_else(|| {
        errors.push("Response has no samlp:Status element".to_string());
        Status {
            code: String::new(),
            sub_code: None,
            message: None,
        }
    });

    let assertions = saml_children(node, ASSERTION_NS, "Assertion")
        .map(|a| read_assertion(a, xml, &mut errors))
        .collect();

    let encrypted_assertions = saml_children(node, ASSERTION_NS, "EncryptedAssertion")
        .map(|e| EncryptedAssertion {
            xml: standalone_xml(e, xml),
        })
        .collect();

    SamlResponse {
        id: node.attribute("ID").map(str::to_string),
        destination: node.attribute("Destination").map(str::to_string),
        issuer: saml_child(node, ASSERTION_NS, "Issuer").and_then(text),
        status,
        assertions,
        encrypted_assertions,
        library_errors: errors,
        raw_xml: standalone_xml(node, xml),
    }
}

fn read_assertion(node: Node, xml: &str, errors: &mut Vec<String>) -> Assertion {
    Assertion {
        id: node.attribute("ID").map(str::to_string),
        issuer: saml_child(node, ASSERTION_NS, "Issuer").and_then(text),
        subject: saml_child(node, ASSERTION_NS, "Subject").map(|s| read_subject(s, xml, errors)),
        conditions: saml_child(node, ASSERTION_NS, "Conditions").map(|c| read_conditions(c, errors)),
        attributes: saml_children(node, ASSERTION_NS, "AttributeStatement")
            .flat_map(|statement| saml_children(statement, ASSERTION_NS, "Attribute"))
            .map(|attr| Attribute {
                name: attr.attribute("Name").map(str::to_string),
                values: saml_children(attr, ASSERTION_NS, "AttributeValue")
                    .map(|v| inner_content(v, xml))
                    .collect(),
            })
            .collect(),
    }
}

fn read_subject(node: Node, xml: &str, errors: &mut Vec<String>) -> Subject {
    Subject {
        name_id: saml_child(node, ASSERTION_NS, "NameID").and_then(|n| {
            text(n).map(|value| NameId {
                value,
                format: n.attribute("Format").map(str::to_string),
            })
        }),
        encrypted_id: saml_child(node, ASSERTION_NS, "EncryptedID").map(|e| EncryptedId {
            xml: standalone_xml(e, xml),
        }),
        confirmations: saml_children(node, ASSERTION_NS, "SubjectConfirmation")
            .map(|c| {
                let data = saml_child(c, ASSERTION_NS, "SubjectConfirmationData");
                SubjectConfirmation {
                    method: c.attribute("Method").map(str::to_string),
                    recipient: data
                        .and_then(|d| d.attribute("Recipient"))
                        .map(str::to_string),
                    not_on_or_after: data.and_then(|d| timestamp(d, "NotOnOrAfter", errors)),
                }
            })
            .collect(),
    }
}

fn read_conditions(node: Node, errors: &mut Vec<String>) -> Conditions {
    let restrictions: Vec<Node> = saml_children(node, ASSERTION_NS, "AudienceRestriction").collect();
    let audiences = if restrictions.is_empty() {
        None
    } else {
        Some(
            restrictions
                .iter()
                .flat_map(|r| saml_children(*r, ASSERTION_NS, "Audience"))
                .filter_map(text)
                .collect(),
        )
    };

    Conditions {
        not_before: timestamp(node, "NotBefore", errors),
        not_on_or_after: timestamp(node, "NotOnOrAfter", errors),
        audiences,
    }
}

fn timestamp(node: Node, attribute: &str, errors: &mut Vec<String>) -> Option<DateTime<Utc>> {
    let value = node.attribute(attribute)?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            errors.push(format!(
                "{}/@{} is not a valid xs:dateTime ({}): {}",
                node.tag_name().name(),
                attribute,
                value,
                e
            ));
            None
        }
    }
}

/// Text of a leaf element, or the markup of its children when the value is
/// embedded XML rather than escaped text.
fn inner_content(node: Node, xml: &str) -> String {
    let mut elements = node.children().filter(|n| n.is_element());
    match (elements.next(), elements.last()) {
        (Some(only), None) => standalone_xml(only, xml),
        (Some(first), Some(last)) => xml[first.range().start..last.range().end].to_string(),
        (None, _) => node.text().unwrap_or_default().trim().to_string(),
    }
}

/// Markup of `node` as a self-contained document. Namespaces inherited from
/// ancestors are declared on the fragment root.
pub(crate) fn standalone_xml(node: Node, xml: &str) -> String {
    let fragment = &xml[node.range()];
    let start_tag = &fragment[..fragment.find('>').unwrap_or(fragment.len())];
    let name_end = fragment
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c.is_whitespace() || c == '/' || c == '>')
        .map_or(fragment.len(), |(i, _)| i);

    let mut declarations = String::new();
    for ns in node.namespaces() {
        let attribute = match ns.name() {
            Some("xml") => continue,
            Some(prefix) => format!("xmlns:{}", prefix),
            None => "xmlns".to_string(),
        };
        if start_tag.contains(&format!("{}=", attribute)) {
            continue;
        }
        declarations.push_str(&format!(r#" {}="{}""#, attribute, escape_attr(ns.uri())));
    }

    format!("{}{}{}", &fragment[..name_end], declarations, &fragment[name_end..])
}

fn text(node: Node) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn saml_child<'a, 'input>(
    node: Node<'a, 'input>,
    ns: &str,
    name: &str,
) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name((ns, name)))
}

fn saml_children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: &'a str,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| n.has_tag_name((ns, name)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Escape an AuthAccess document for embedding as attribute text.
    pub fn escape(xml: &str) -> String {
        xml.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
    }

    pub struct ResponseFixture {
        pub destination: String,
        pub issuer: String,
        pub status_code: String,
        pub name_id: String,
        pub not_before: String,
        pub not_on_or_after: String,
        pub audience: String,
        pub recipient: String,
        pub payload: String,
        pub assertions: usize,
    }

    impl ResponseFixture {
        pub fn new(payload: String) -> Self {
            Self {
                destination: "https://sp.example.com/saml/acs".to_string(),
                issuer: "https://idp.example.com".to_string(),
                status_code: "urn:oasis:names:tc:SAML:2.0:status:Success".to_string(),
                name_id: "S1234567A".to_string(),
                not_before: "2015-11-30T04:40:00Z".to_string(),
                not_on_or_after: "2015-11-30T04:50:00Z".to_string(),
                audience: "https://sp.example.com".to_string(),
                recipient: "https://sp.example.com/saml/acs".to_string(),
                payload,
                assertions: 1,
            }
        }

        pub fn assertion(&self, id: usize) -> String {
            format!(
                r#"<saml:Assertion ID="_a{id}" Version="2.0" IssueInstant="2015-11-30T04:40:00Z">
    <saml:Issuer>{issuer}</saml:Issuer>
    <saml:Subject>
      <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified">{name_id}</saml:NameID>
      <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
        <saml:SubjectConfirmationData Recipient="{recipient}" NotOnOrAfter="{not_on_or_after}"/>
      </saml:SubjectConfirmation>
    </saml:Subject>
    <saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}">
      <saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction>
    </saml:Conditions>
    <saml:AttributeStatement>
      <saml:Attribute Name="BGPS"><saml:AttributeValue>{payload}</saml:AttributeValue></saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>"#,
                id = id,
                issuer = self.issuer,
                name_id = self.name_id,
                recipient = self.recipient,
                not_before = self.not_before,
                not_on_or_after = self.not_on_or_after,
                audience = self.audience,
                payload = escape(&self.payload),
            )
        }

        pub fn to_xml(&self) -> String {
            let assertions: String = (0..self.assertions).map(|i| self.assertion(i)).collect();
            format!(
                r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0" IssueInstant="2015-11-30T04:40:00Z" Destination="{destination}">
  <saml:Issuer>{issuer}</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="{status}"/></samlp:Status>
  {assertions}
</samlp:Response>"#,
                destination = self.destination,
                issuer = self.issuer,
                status = self.status_code,
                assertions = assertions,
            )
        }
    }
}
