//! Schema conformance for AuthAccess documents.
//!
//! [`SchemaValidator`] is the seam for an external XSD engine. The bundled
//! [`AuthAccessSchema`] enforces the structural rules of `AuthAccess.xsd`
//! that the extractor relies on. The root element name is not checked here;
//! that is a separate payload check.

use roxmltree::{Document, Node};

/// Validates a parsed document against a schema, returning one message per
/// violation. An empty list means the document conforms.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, doc: &Document) -> Vec<String>;
}

/// Built-in structural rules of the AuthAccess schema.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthAccessSchema;

impl SchemaValidator for AuthAccessSchema {
    fn validate(&self, doc: &Document) -> Vec<String> {
        let mut errors = Vec::new();
        let root = doc.root_element();

        if let Some(user_info) = required(root, "UserInfo", &mut errors) {
            required(user_info, "CPUID", &mut errors);
        }
        if let Some(entity_info) = required(root, "EntityInfo", &mut errors) {
            required(entity_info, "CPEntID", &mut errors);
        }

        let Some(result_set) = required(root, "Result_Set", &mut errors) else {
            return errors;
        };
        if let Some(count) = required(result_set, "ESrvc_Row_Count", &mut errors) {
            counter(count, &mut errors);
        }

        for eservice in elements(result_set, "ESrvc_Result") {
            required(eservice, "CPESrvcID", &mut errors);
            let Some(auth_set) = required(eservice, "Auth_Result_Set", &mut errors) else {
                continue;
            };
            if let Some(count) = required(auth_set, "Row_Count", &mut errors) {
                counter(count, &mut errors);
            }
            for row in elements(auth_set, "Row") {
                required(row, "CPRole", &mut errors);
                for param in elements(row, "Parameter") {
                    if param.attribute("name").map_or(true, str::is_empty) {
                        errors.push(
                            "Element 'Parameter': The attribute 'name' is required but missing."
                                .to_string(),
                        );
                    }
                }
            }
        }

        errors
    }
}

/// Child elements of `node` with the given local name.
pub(crate) fn elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn required<'a, 'input>(
    parent: Node<'a, 'input>,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<Node<'a, 'input>> {
    let found = parent
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == name);
    if found.is_none() {
        errors.push(format!(
            "Element '{}': Missing child element '{}'.",
            parent.tag_name().name(),
            name
        ));
    }
    found
}

fn counter(node: Node, errors: &mut Vec<String>) {
    let text = node.text().map(str::trim).unwrap_or("");
    if text.parse::<u32>().is_err() {
        errors.push(format!(
            "Element '{}': '{}' is not a valid value of the atomic type 'xs:nonNegativeInteger'.",
            node.tag_name().name(),
            text
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(xml: &str) -> Vec<String> {
        let doc = Document::parse(xml).unwrap();
        AuthAccessSchema.validate(&doc)
    }

    #[test]
    fn test_minimal_document_conforms() {
        let xml = r#"<AuthAccess>
            <UserInfo><CPUID>S1234567A</CPUID></UserInfo>
            <EntityInfo><CPEntID>53012345X</CPEntID></EntityInfo>
            <Result_Set><ESrvc_Row_Count>0</ESrvc_Row_Count></Result_Set>
        </AuthAccess>"#;
        assert!(check(xml).is_empty());
    }

    #[test]
    fn test_missing_containers() {
        let errors = check("<AuthAccess><UserInfo/></AuthAccess>");
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("Missing child element 'CPUID'"));
        assert!(errors[1].contains("Missing child element 'EntityInfo'"));
        assert!(errors[2].contains("Missing child element 'Result_Set'"));
    }

    #[test]
    fn test_counters_and_parameters() {
        let xml = r#"<AuthAccess>
            <UserInfo><CPUID>S1234567A</CPUID></UserInfo>
            <EntityInfo><CPEntID>53012345X</CPEntID></EntityInfo>
            <Result_Set>
              <ESrvc_Row_Count>one</ESrvc_Row_Count>
              <ESrvc_Result>
                <CPESrvcID>BGPS</CPESrvcID>
                <Auth_Result_Set>
                  <Row_Count>1</Row_Count>
                  <Row><CPRole>Acceptor</CPRole><Parameter>x</Parameter></Row>
                </Auth_Result_Set>
              </ESrvc_Result>
            </Result_Set>
        </AuthAccess>"#;
        let errors = check(xml);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("'one' is not a valid value"));
        assert!(errors[1].contains("attribute 'name' is required"));
    }
}
