//! AuthAccess payload extraction and validation.

use chrono::NaiveDate;
use roxmltree::{Document, Node};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::schema::{elements, AuthAccessSchema, SchemaValidator};
use super::types::{
    AuthRow, EntityStatus, EserviceResult, Parameter, PayloadError, AUTH_ACCESS_ROOT,
    DATE_FORMAT,
};
use crate::error::{Error, Result};
use crate::notify::{Notifier, NotifyEvent, TracingNotifier};

/// Typed, validated view over an AuthAccess document.
///
/// Construction never fails. Accessors read from a snapshot built on first
/// use and never validate; call [`AuthAccess::validate`] or
/// [`AuthAccess::assert_valid`] before trusting them. Every check runs once
/// per instance and the result is cached.
#[derive(Clone)]
pub struct AuthAccess {
    raw: String,
    schema: Arc<dyn SchemaValidator>,
    notifier: Arc<dyn Notifier>,
    parsed: OnceLock<Parsed>,
    extraction: OnceLock<Extraction>,
    report: OnceLock<Vec<PayloadError>>,
}

#[derive(Debug, Clone, Default)]
struct Parsed {
    snapshot: Snapshot,
    parse_error: Option<String>,
}

/// Scalar fields and raw e-service structures, as text.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    root_tag: String,
    login_id: Option<String>,
    account_type: Option<String>,
    user_id: Option<String>,
    user_id_country: Option<String>,
    user_id_issue_date: Option<String>,
    entity_id: Option<String>,
    entity_status: Option<String>,
    entity_type: Option<String>,
    sp_holder: Option<String>,
    eservice_count: Option<String>,
    eservices: Vec<RawEservice>,
}

#[derive(Debug, Clone, Default)]
struct RawEservice {
    id: Option<String>,
    row_count: Option<String>,
    rows: Vec<RawRow>,
}

#[derive(Debug, Clone, Default)]
struct RawRow {
    entity_id_sub: Option<String>,
    role: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Default)]
struct Extraction {
    results: Vec<EserviceResult>,
    errors: Vec<PayloadError>,
}

impl AuthAccess {
    /// Wrap a raw AuthAccess document using the bundled schema rules.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            schema: Arc::new(AuthAccessSchema),
            notifier: Arc::new(TracingNotifier),
            parsed: OnceLock::new(),
            extraction: OnceLock::new(),
            report: OnceLock::new(),
        }
    }

    /// Use an external schema engine instead of the bundled rules.
    pub fn with_schema(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.schema = schema;
        self
    }

    /// Send validation messages to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// The raw document this payload was built from.
    pub fn raw_xml(&self) -> &str {
        &self.raw
    }

    /// Run every check once and report whether the payload is valid.
    pub fn validate(&self) -> bool {
        self.errors().is_empty()
    }

    /// Validation failures, in check order.
    pub fn errors(&self) -> &[PayloadError] {
        self.report.get_or_init(|| {
            let errors = self.run_checks();
            for error in &errors {
                self.notifier
                    .notify(NotifyEvent::PayloadValidationError, &error.to_string());
            }
            debug!(errors = errors.len(), "AuthAccess payload validated");
            errors
        })
    }

    /// Validation messages joined into one line.
    pub fn error_messages(&self) -> String {
        join_messages(self.errors())
    }

    /// Fail with [`Error::InvalidPayload`] unless every check passes.
    pub fn assert_valid(&self) -> Result<()> {
        if self.validate() {
            return Ok(());
        }
        Err(Error::InvalidPayload {
            messages: self.error_messages(),
            raw_xml: self.raw.clone(),
        })
    }

    fn run_checks(&self) -> Vec<PayloadError> {
        let mut errors = Vec::new();

        if let Some(ref reason) = self.parsed().parse_error {
            errors.push(PayloadError::Malformed(reason.clone()));
            return errors;
        }

        match Document::parse(&self.raw) {
            Ok(doc) => {
                let schema_errors = self.schema.validate(&doc);
                if !schema_errors.is_empty() {
                    errors.extend(schema_errors.into_iter().map(PayloadError::Schema));
                    return errors;
                }
            }
            Err(e) => {
                errors.push(PayloadError::Malformed(e.to_string()));
                return errors;
            }
        }

        let snapshot = self.snapshot();

        if snapshot.root_tag != AUTH_ACCESS_ROOT {
            errors.push(PayloadError::RootElement {
                found: snapshot.root_tag.clone(),
            });
        }

        if self.entity_status().is_none() {
            errors.push(PayloadError::EntityStatus(snapshot.entity_status.clone()));
        }

        if !self.has_single_eservice_result() {
            errors.push(PayloadError::EserviceCardinality {
                found: snapshot.eservices.len(),
                declared: snapshot.eservice_count.clone(),
            });
        }

        if let Some(ref value) = snapshot.user_id_issue_date {
            if parse_date(value).is_none() {
                errors.push(PayloadError::InvalidDate {
                    field: "CPUID_Date",
                    value: value.clone(),
                });
            }
        }

        errors.extend(self.extraction().errors.iter().cloned());
        errors
    }

    /// Exactly one `ESrvc_Result` element and a declared count of 1.
    pub fn has_single_eservice_result(&self) -> bool {
        self.snapshot().eservices.len() == 1 && self.eservice_count() == Some(1)
    }

    pub fn login_id(&self) -> Option<&str> {
        self.snapshot().login_id.as_deref()
    }

    pub fn account_type(&self) -> Option<&str> {
        self.snapshot().account_type.as_deref()
    }

    /// National identifier of the user; must match the SAML NameID.
    pub fn user_id(&self) -> Option<&str> {
        self.snapshot().user_id.as_deref()
    }

    pub fn user_id_country(&self) -> Option<&str> {
        self.snapshot().user_id_country.as_deref()
    }

    /// Issue date of the national identifier. `None` when absent or
    /// malformed; malformed values are reported by `validate`.
    pub fn user_id_issue_date(&self) -> Option<NaiveDate> {
        self.snapshot()
            .user_id_issue_date
            .as_deref()
            .and_then(parse_date)
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.snapshot().entity_id.as_deref()
    }

    /// Entity status, `None` when absent or outside the closed set.
    pub fn entity_status(&self) -> Option<EntityStatus> {
        self.snapshot()
            .entity_status
            .as_deref()
            .and_then(EntityStatus::parse)
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.snapshot().entity_type.as_deref()
    }

    pub fn is_sp_holder(&self) -> bool {
        self.snapshot()
            .sp_holder
            .as_deref()
            .map_or(false, |v| v.eq_ignore_ascii_case("YES"))
    }

    /// `ESrvc_Row_Count` as declared by the document.
    pub fn eservice_count(&self) -> Option<u32> {
        self.snapshot()
            .eservice_count
            .as_deref()
            .and_then(|v| v.parse().ok())
    }

    /// Every e-service result with its rows, in document order.
    pub fn eservice_results(&self) -> &[EserviceResult] {
        &self.extraction().results
    }

    /// Result for one e-service id.
    pub fn eservice(&self, eservice_id: &str) -> Option<&EserviceResult> {
        self.eservice_results()
            .iter()
            .find(|r| r.eservice_id.as_deref() == Some(eservice_id))
    }

    /// Distinct roles granted for an e-service, in first-seen order.
    pub fn roles(&self, eservice_id: &str) -> Vec<&str> {
        let mut roles: Vec<&str> = Vec::new();
        if let Some(result) = self.eservice(eservice_id) {
            for role in result.auth_result_set.iter().filter_map(|r| r.role.as_deref()) {
                if !roles.contains(&role) {
                    roles.push(role);
                }
            }
        }
        roles
    }

    fn parsed(&self) -> &Parsed {
        self.parsed.get_or_init(|| match Document::parse(&self.raw) {
            Ok(doc) => Parsed {
                snapshot: read_snapshot(doc.root_element()),
                parse_error: None,
            },
            Err(e) => Parsed {
                snapshot: Snapshot::default(),
                parse_error: Some(e.to_string()),
            },
        })
    }

    fn snapshot(&self) -> &Snapshot {
        &self.parsed().snapshot
    }

    fn extraction(&self) -> &Extraction {
        self.extraction
            .get_or_init(|| extract_eservices(&self.snapshot().eservices))
    }
}

impl PartialEq for AuthAccess {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for AuthAccess {}

impl std::fmt::Debug for AuthAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthAccess").field("raw", &self.raw).finish()
    }
}

pub(crate) fn join_messages<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn text(node: Option<Node>) -> Option<String> {
    node.and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn read_snapshot(root: Node) -> Snapshot {
    let user_info = child(root, "UserInfo");
    let entity_info = child(root, "EntityInfo");
    let result_set = child(root, "Result_Set");
    let user = |name: &str| text(user_info.and_then(|n| child(n, name)));
    let entity = |name: &str| text(entity_info.and_then(|n| child(n, name)));

    Snapshot {
        root_tag: root.tag_name().name().to_string(),
        login_id: user("CPUserID"),
        account_type: user("CPAccType"),
        user_id: user("CPUID"),
        user_id_country: user("CPUID_Country"),
        user_id_issue_date: user("CPUID_Date"),
        entity_id: entity("CPEntID"),
        entity_status: entity("CPEnt_Status"),
        entity_type: entity("CPEnt_TYPE"),
        sp_holder: entity("ISSPHOLDER"),
        eservice_count: text(result_set.and_then(|n| child(n, "ESrvc_Row_Count"))),
        eservices: result_set
            .map(|set| elements(set, "ESrvc_Result").map(read_eservice).collect())
            .unwrap_or_default(),
    }
}

fn read_eservice(node: Node) -> RawEservice {
    let auth_set = child(node, "Auth_Result_Set");
    RawEservice {
        id: text(child(node, "CPESrvcID")),
        row_count: text(auth_set.and_then(|n| child(n, "Row_Count"))),
        rows: auth_set
            .map(|set| elements(set, "Row").map(read_row).collect())
            .unwrap_or_default(),
    }
}

fn read_row(node: Node) -> RawRow {
    RawRow {
        entity_id_sub: text(child(node, "CPEntID_SUB")),
        role: text(child(node, "CPRole")),
        start_date: text(child(node, "StartDate")),
        end_date: text(child(node, "EndDate")),
        parameters: elements(node, "Parameter")
            .map(|p| Parameter {
                name: p.attribute("name").unwrap_or_default().to_string(),
                value: p.text().map(str::trim).unwrap_or_default().to_string(),
            })
            .collect(),
    }
}

/// Map raw e-services into typed results. Row count mismatches and bad
/// dates are recorded, the rows actually present are always returned.
fn extract_eservices(raw: &[RawEservice]) -> Extraction {
    let mut extraction = Extraction::default();

    for eservice in raw {
        let declared = eservice.row_count.as_deref().and_then(|v| v.parse::<u32>().ok());
        if declared != Some(eservice.rows.len() as u32) {
            extraction.errors.push(PayloadError::RowCountMismatch {
                eservice_id: eservice.id.clone(),
                declared: eservice
                    .row_count
                    .clone()
                    .unwrap_or_else(|| "(missing)".to_string()),
                actual: eservice.rows.len(),
            });
        }

        let rows = eservice
            .rows
            .iter()
            .map(|row| AuthRow {
                entity_id_sub: row.entity_id_sub.clone(),
                role: row.role.clone(),
                start_date: typed_date("StartDate", &row.start_date, &mut extraction.errors),
                end_date: typed_date("EndDate", &row.end_date, &mut extraction.errors),
                parameters: row.parameters.clone(),
            })
            .collect();

        extraction.results.push(EserviceResult {
            eservice_id: eservice.id.clone(),
            declared_row_count: declared,
            auth_result_set: rows,
        });
    }

    extraction
}

fn typed_date(
    field: &'static str,
    value: &Option<String>,
    errors: &mut Vec<PayloadError>,
) -> Option<NaiveDate> {
    let value = value.as_deref()?;
    let date = parse_date(value);
    if date.is_none() {
        errors.push(PayloadError::InvalidDate {
            field,
            value: value.to_string(),
        });
    }
    date
}


#[cfg(test)]
mod tests {
    use super::fixtures::auth_access_xml;
    use super::*;
    use crate::notify::testing::RecordingNotifier;

    fn valid() -> String {
        auth_access_xml("S1234567A")
    }

    #[test]
    fn test_valid_payload() {
        let payload = AuthAccess::new(valid());
        assert!(payload.validate());
        assert!(payload.errors().is_empty());
        assert!(payload.assert_valid().is_ok());
    }

    #[test]
    fn test_accessors_read_document_values() {
        let payload = AuthAccess::new(valid());

        // Order independent and repeatable.
        assert_eq!(payload.entity_status(), Some(EntityStatus::Active));
        assert_eq!(payload.user_id(), Some("S1234567A"));
        assert_eq!(payload.entity_id(), Some("53012345X"));
        assert_eq!(payload.user_id(), Some("S1234567A"));

        assert_eq!(payload.login_id(), Some("JDOE01"));
        assert_eq!(payload.account_type(), Some("User"));
        assert_eq!(payload.user_id_country(), Some("SG"));
        assert_eq!(
            payload.user_id_issue_date(),
            NaiveDate::from_ymd_opt(2001, 1, 1)
        );
        assert_eq!(payload.entity_type(), Some("UEN"));
        assert!(payload.is_sp_holder());
        assert_eq!(payload.eservice_count(), Some(1));
    }

    #[test]
    fn test_eservice_extraction() {
        let payload = AuthAccess::new(valid());
        let results = payload.eservice_results();
        assert_eq!(results.len(), 1);

        let bgps = payload.eservice("BGPS").unwrap();
        assert_eq!(bgps.declared_row_count, Some(2));
        assert_eq!(bgps.auth_result_set.len(), 2);

        let first = &bgps.auth_result_set[0];
        assert_eq!(first.entity_id_sub.as_deref(), Some("SUB001"));
        assert_eq!(first.parameters.len(), 2);
        assert_eq!(first.parameter("Scheme"), Some("Grants"));
        assert_eq!(first.end_date, NaiveDate::from_ymd_opt(2016, 2, 15));

        assert_eq!(payload.roles("BGPS"), vec!["Acceptor", "Preparer"]);
        assert!(payload.roles("OTHER").is_empty());
    }

    #[test]
    fn test_unknown_entity_status() {
        for status in ["Registered", "active", ""] {
            let xml = valid().replace(
                "<CPEnt_Status>Active</CPEnt_Status>",
                &format!("<CPEnt_Status>{}</CPEnt_Status>", status),
            );
            let payload = AuthAccess::new(xml);
            assert!(!payload.validate());
            assert!(payload
                .errors()
                .iter()
                .any(|e| matches!(e, PayloadError::EntityStatus(_))));
        }
    }

    #[test]
    fn test_missing_entity_status_fails_membership() {
        let xml = valid().replace("<CPEnt_Status>Active</CPEnt_Status>", "");
        let payload = AuthAccess::new(xml);
        assert_eq!(payload.entity_status(), None);
        assert_eq!(payload.errors(), &[PayloadError::EntityStatus(None)]);
    }

    #[test]
    fn test_two_eservice_results() {
        let second = r#"<ESrvc_Result>
      <CPESrvcID>OTHER</CPESrvcID>
      <Auth_Result_Set><Row_Count>0</Row_Count></Auth_Result_Set>
    </ESrvc_Result>
  </Result_Set>"#;
        let xml = valid().replace("</Result_Set>", second);
        let payload = AuthAccess::new(xml);
        assert!(!payload.validate());
        assert!(payload.errors().contains(&PayloadError::EserviceCardinality {
            found: 2,
            declared: Some("1".to_string()),
        }));
        // Rows stay well-formed; only the cardinality is wrong.
        assert_eq!(payload.errors().len(), 1);
        assert_eq!(payload.eservice_results().len(), 2);
    }

    #[test]
    fn test_declared_eservice_count_must_be_one() {
        let xml = valid().replace(
            "<ESrvc_Row_Count>1</ESrvc_Row_Count>",
            "<ESrvc_Row_Count>2</ESrvc_Row_Count>",
        );
        let payload = AuthAccess::new(xml);
        assert!(!payload.has_single_eservice_result());
        assert!(!payload.validate());
        assert!(payload
            .error_messages()
            .contains("Expected exactly one e-service result, found 1 with declared count 2"));
    }

    #[test]
    fn test_row_count_mismatch_is_total() {
        let xml = valid().replace("<Row_Count>2</Row_Count>", "<Row_Count>5</Row_Count>");
        let payload = AuthAccess::new(xml);
        assert!(!payload.validate());
        let message = payload.error_messages();
        assert!(message.contains("Row_Count 5"));
        assert!(message.contains("contains 2 rows"));
        assert_eq!(payload.eservice_results()[0].auth_result_set.len(), 2);
    }

    #[test]
    fn test_malformed_dates_are_recorded() {
        let xml = valid()
            .replace("<CPUID_Date>2001-01-01</CPUID_Date>", "<CPUID_Date>01/01/2001</CPUID_Date>")
            .replace("<EndDate>2016-02-15</EndDate>", "<EndDate>someday</EndDate>");
        let payload = AuthAccess::new(xml);
        assert_eq!(payload.user_id_issue_date(), None);
        assert_eq!(payload.eservice_results()[0].auth_result_set[0].end_date, None);
        assert!(!payload.validate());
        assert_eq!(
            payload.errors(),
            &[
                PayloadError::InvalidDate {
                    field: "CPUID_Date",
                    value: "01/01/2001".to_string(),
                },
                PayloadError::InvalidDate {
                    field: "EndDate",
                    value: "someday".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_wrong_root_element() {
        let xml = valid()
            .replace("<AuthAccess xmlns", "<Entitlements xmlns")
            .replace("</AuthAccess>", "</Entitlements>");
        let payload = AuthAccess::new(xml);
        assert!(!payload.validate());
        assert_eq!(
            payload.errors(),
            &[PayloadError::RootElement {
                found: "Entitlements".to_string()
            }]
        );
    }

    #[test]
    fn test_schema_failure_short_circuits() {
        let payload = AuthAccess::new("<AuthAccess><UserInfo/></AuthAccess>");
        assert!(!payload.validate());
        assert!(payload
            .errors()
            .iter()
            .all(|e| matches!(e, PayloadError::Schema(_))));
    }

    #[test]
    fn test_malformed_document() {
        let payload = AuthAccess::new("<AuthAccess><UserInfo>");
        assert!(!payload.validate());
        assert!(matches!(payload.errors()[0], PayloadError::Malformed(_)));
        assert_eq!(payload.user_id(), None);
        assert!(payload.eservice_results().is_empty());

        match payload.assert_valid() {
            Err(Error::InvalidPayload { raw_xml, messages }) => {
                assert_eq!(raw_xml, "<AuthAccess><UserInfo>");
                assert!(messages.contains("not well-formed"));
            }
            other => panic!("expected InvalidPayload, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_runs_once_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::default());
        let xml = valid().replace("<CPEnt_Status>Active</CPEnt_Status>", "");
        let payload = AuthAccess::new(xml).with_notifier(notifier.clone());

        assert!(!payload.validate());
        assert!(!payload.validate());
        assert_eq!(payload.errors().len(), 1);
        assert_eq!(notifier.count(NotifyEvent::PayloadValidationError), 1);
    }

    #[test]
    fn test_external_schema_engine() {
        struct RejectAll;
        impl SchemaValidator for RejectAll {
            fn validate(&self, _doc: &Document) -> Vec<String> {
                vec!["Element 'AuthAccess': No matching global declaration.".to_string()]
            }
        }

        let payload = AuthAccess::new(valid()).with_schema(Arc::new(RejectAll));
        assert!(!payload.validate());
        assert_eq!(payload.errors().len(), 1);
    }

    #[test]
    fn test_equality_uses_raw_document() {
        let a = AuthAccess::new(valid());
        let b = AuthAccess::new(valid());
        assert_eq!(a, b);
        assert_ne!(a, AuthAccess::new(auth_access_xml("T7654321B")));
    }
}
