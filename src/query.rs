//! Compiles search criteria into DSML filters and resolves scope routing

use crate::config::DirectoryEndpoint;
use crate::criteria::{non_blank, DnSelector, MatchMode, SearchCriteria, SearchScope, ServiceProfile};
use crate::dn;
use crate::error::HpdError;
use quick_xml::escape::escape;
use tracing::warn;

const NPI_IDENTIFIER_FORMAT: (&str, &str) = ("2.16.840.1.113883.4.6:NPI:", ":Active");
const PRACTICE_ADDRESS: &str = "hpdProviderPracticeAddress";
const MAILING_ADDRESS: &str = "hpdProviderMailingAddress";
const BILLING_ADDRESS: &str = "hpdProviderBillingAddress";
const SERVICE_ADDRESS: &str = "hpdMedicalRecordsDeliveryEmailAddress";

/// Traversal depth of a search request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    SingleLevel,
    WholeSubtree,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::SingleLevel => "singleLevel",
            Depth::WholeSubtree => "wholeSubtree",
        }
    }
}

/// Subtree OU and depth for a scope
pub fn route(scope: SearchScope) -> (Option<&'static str>, Depth) {
    match scope {
        SearchScope::AllEntities => (None, Depth::WholeSubtree),
        SearchScope::IndividualProvidersOnly => (Some(dn::INDIVIDUAL_OU), Depth::SingleLevel),
        SearchScope::OrgsOnly => (Some(dn::ORG_OU), Depth::SingleLevel),
        SearchScope::CredentialsOnly => (Some(dn::CREDENTIAL_OU), Depth::SingleLevel),
        SearchScope::HasAProviderRelationshipsOnly
        | SearchScope::HasAnOrgRelationshipsOnly
        | SearchScope::ProvidersAffiliatedToOrg => (Some(dn::RELATIONSHIP_OU), Depth::SingleLevel),
        SearchScope::ServicesOnly => (Some(dn::SERVICE_OU), Depth::SingleLevel),
    }
}

/// DSML filter expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality { attribute: String, value: String },
    SubstringAny { attribute: String, value: String },
    SubstringInitial { attribute: String, value: String },
    Present { attribute: String },
}

impl Filter {
    pub fn equality(attribute: &str, value: impl Into<String>) -> Self {
        Filter::Equality {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    pub fn contains(attribute: &str, value: impl Into<String>) -> Self {
        Filter::SubstringAny {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    pub fn starts_with(attribute: &str, value: impl Into<String>) -> Self {
        Filter::SubstringInitial {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    pub fn present(attribute: &str) -> Self {
        Filter::Present {
            attribute: attribute.to_string(),
        }
    }

    /// Fragment for `attribute` under a match mode
    pub fn matching(mode: MatchMode, attribute: &str, value: &str) -> Self {
        match mode {
            MatchMode::Equality => Filter::equality(attribute, value),
            MatchMode::Contains => Filter::contains(attribute, value),
            MatchMode::StartsWith => Filter::starts_with(attribute, value),
            MatchMode::Exists => Filter::present(attribute),
            MatchMode::NotExists => Filter::Not(Box::new(Filter::present(attribute))),
        }
    }

    /// OR of the given fragments; a single fragment is returned as is
    pub fn any_of(mut fragments: Vec<Filter>) -> Self {
        if fragments.len() == 1 {
            fragments.remove(0)
        } else {
            Filter::Or(fragments)
        }
    }

    /// True if this fragment or any child tests `attribute`
    pub fn references(&self, attribute: &str) -> bool {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                children.iter().any(|child| child.references(attribute))
            }
            Filter::Not(inner) => inner.references(attribute),
            Filter::Equality { attribute: a, .. }
            | Filter::SubstringAny { attribute: a, .. }
            | Filter::SubstringInitial { attribute: a, .. }
            | Filter::Present { attribute: a } => a.eq_ignore_ascii_case(attribute),
        }
    }

    pub fn to_dsml(&self) -> String {
        let mut out = String::new();
        self.write_dsml(&mut out);
        out
    }

    fn write_dsml(&self, out: &mut String) {
        match self {
            Filter::And(children) => {
                out.push_str("<and>");
                children.iter().for_each(|c| c.write_dsml(out));
                out.push_str("</and>");
            }
            Filter::Or(children) => {
                out.push_str("<or>");
                children.iter().for_each(|c| c.write_dsml(out));
                out.push_str("</or>");
            }
            Filter::Not(inner) => {
                out.push_str("<not>");
                inner.write_dsml(out);
                out.push_str("</not>");
            }
            Filter::Equality { attribute, value } => out.push_str(&format!(
                "<equalityMatch name='{}'><value>{}</value></equalityMatch>",
                escape(attribute.as_str()),
                escape(value.as_str())
            )),
            Filter::SubstringAny { attribute, value } => out.push_str(&format!(
                "<substrings name='{}'><any>{}</any></substrings>",
                escape(attribute.as_str()),
                escape(value.as_str())
            )),
            Filter::SubstringInitial { attribute, value } => out.push_str(&format!(
                "<substrings name='{}'><initial>{}</initial></substrings>",
                escape(attribute.as_str()),
                escape(value.as_str())
            )),
            Filter::Present { attribute } => {
                out.push_str(&format!("<present name='{}'/>", escape(attribute.as_str())))
            }
        }
    }
}

/// A search ready to be wrapped in an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub scope: SearchScope,
    pub base_dn: String,
    pub depth: Depth,
    pub fragments: Vec<Filter>,
}

impl CompiledQuery {
    /// Body of the `<filter>` element.
    ///
    /// Fragments are ANDed together, except when one of them tests the
    /// practice address: then they are emitted side by side with no wrapper.
    pub fn filter_dsml(&self) -> String {
        let touches_practice = self.fragments.iter().any(|f| f.references(PRACTICE_ADDRESS));
        if self.fragments.len() == 1 || touches_practice {
            self.fragments.iter().map(Filter::to_dsml).collect()
        } else {
            Filter::And(self.fragments.clone()).to_dsml()
        }
    }

    /// `<searchRequest>` element carrying this query
    pub fn search_request_dsml(&self, request_id: &str) -> String {
        format!(
            "<searchRequest dn='{}' scope='{}' derefAliases='derefFindingBaseObj' requestID='{}'><filter>{}</filter></searchRequest>",
            escape(self.base_dn.as_str()),
            self.depth.as_str(),
            escape(request_id),
            self.filter_dsml()
        )
    }
}

pub struct QueryCompiler;

impl QueryCompiler {
    /// Reject criteria that are internally inconsistent
    pub fn validate(criteria: &SearchCriteria) -> Result<(), HpdError> {
        if criteria.service_profile != ServiceProfile::DirectProjectSmtp {
            return Err(HpdError::contract(format!(
                "service profile {:?} is not supported",
                criteria.service_profile
            )));
        }

        let scope = criteria.scope;
        let has_uid = non_blank(&criteria.uid).is_some();
        let org_scoped = matches!(
            scope,
            SearchScope::HasAnOrgRelationshipsOnly | SearchScope::ProvidersAffiliatedToOrg
        );

        match &criteria.dn_selector {
            Some(selector) => {
                if !selector.fits(scope) {
                    return Err(HpdError::contract(format!(
                        "{} cannot be used with scope {:?}",
                        selector.label(),
                        scope
                    )));
                }
                if selector.dns().is_empty() && !(org_scoped && has_uid) {
                    return Err(HpdError::contract(format!(
                        "scope {:?} requires non-empty {}",
                        scope,
                        selector.label()
                    )));
                }
                let free_text = criteria
                    .text_fields()
                    .into_iter()
                    .any(|(label, _)| !(org_scoped && label == "uid"));
                if free_text {
                    return Err(HpdError::contract(format!(
                        "{} cannot be combined with free-text criteria",
                        selector.label()
                    )));
                }
            }
            None => {
                let needs_dns = match scope {
                    SearchScope::CredentialsOnly
                    | SearchScope::HasAProviderRelationshipsOnly
                    | SearchScope::ServicesOnly => true,
                    SearchScope::HasAnOrgRelationshipsOnly | SearchScope::ProvidersAffiliatedToOrg => {
                        !has_uid
                    }
                    _ => false,
                };
                if needs_dns {
                    return Err(HpdError::contract(format!("scope {:?} requires a DN list", scope)));
                }
            }
        }
        Ok(())
    }

    /// Compile criteria for one directory
    pub fn compile(criteria: &SearchCriteria, endpoint: &DirectoryEndpoint) -> Result<CompiledQuery, HpdError> {
        Self::validate(criteria)?;

        let scope = criteria.scope;
        let directory_id = endpoint.id.as_str();
        let mut fragments = Vec::new();

        if let Some(uid) = non_blank(&criteria.uid) {
            if !matches!(
                scope,
                SearchScope::HasAnOrgRelationshipsOnly | SearchScope::ProvidersAffiliatedToOrg
            ) {
                fragments.push(Filter::equality("uid", dn::qualify_uid(directory_id, uid)));
            }
        }

        Self::name_fragments(criteria, &mut fragments);

        if let Some(npi) = non_blank(&criteria.npi) {
            let (prefix, suffix) = NPI_IDENTIFIER_FORMAT;
            fragments.push(Filter::equality("hcIdentifier", format!("{}{}{}", prefix, npi, suffix)));
        }
        if let Some(org_id) = non_blank(&criteria.org_id) {
            fragments.push(Filter::contains("hcIdentifier", org_id));
        }
        if let Some(registered) = non_blank(&criteria.registered_name) {
            fragments.push(Filter::contains("hcRegisteredName", registered));
        }
        if let Some(description) = non_blank(&criteria.description) {
            fragments.push(Filter::matching(criteria.name_match, "description", description));
        }
        if let Some(gender) = non_blank(&criteria.gender) {
            fragments.push(Filter::equality("gender", gender));
        }
        if let Some(language) = non_blank(&criteria.language_code) {
            fragments.push(Filter::equality("hpdProviderLanguageSupported", language));
        }
        if let Some(email) = non_blank(&criteria.email) {
            fragments.push(Filter::contains("mail", email.to_lowercase()));
        }
        if let Some(code) = non_blank(&criteria.specialization_code) {
            fragments.push(Filter::contains("hcSpecialization", code));
        }
        if let Some(text) = non_blank(&criteria.specialization_text) {
            fragments.push(Filter::contains("hcSpecialization", text));
        }
        if let Some(fax) = non_blank(&criteria.fax_number) {
            fragments.push(Filter::contains("facsimileTelephoneNumber", fax));
        }
        if let Some(phone) = non_blank(&criteria.telephone_number) {
            fragments.push(Filter::contains("telephoneNumber", phone));
        }

        match criteria.service_match.0 {
            mode @ (MatchMode::Exists | MatchMode::NotExists) => {
                fragments.push(Filter::matching(mode, SERVICE_ADDRESS, ""));
            }
            mode => {
                if let Some(address) = non_blank(&criteria.service_address) {
                    fragments.push(Filter::matching(mode, SERVICE_ADDRESS, address));
                }
            }
        }

        if let Some(postal) = non_blank(&criteria.postal_code) {
            let qualifier = format!("postalCode={}", postal);
            fragments.push(Filter::Or(vec![
                Filter::starts_with("postalCode", postal),
                Filter::contains(MAILING_ADDRESS, qualifier.as_str()),
                Filter::contains(PRACTICE_ADDRESS, qualifier.as_str()),
                Filter::contains(BILLING_ADDRESS, qualifier.as_str()),
            ]));
        }
        if let Some(state) = non_blank(&criteria.state) {
            let qualifier = format!("state={}", state);
            fragments.push(Filter::Or(vec![
                Filter::equality("stateOrProvinceName", state),
                Filter::contains(MAILING_ADDRESS, qualifier.as_str()),
                Filter::contains(PRACTICE_ADDRESS, qualifier.as_str()),
                Filter::contains(BILLING_ADDRESS, qualifier.as_str()),
            ]));
        }
        for text in [&criteria.address_text, &criteria.address_text2].into_iter().filter_map(non_blank) {
            fragments.push(Filter::Or(vec![
                Filter::contains("postalAddress", text),
                Filter::contains(MAILING_ADDRESS, text),
                Filter::contains(PRACTICE_ADDRESS, text),
                Filter::contains(BILLING_ADDRESS, text),
            ]));
        }

        if let Some(fragment) = Self::dn_fragment(criteria, endpoint)? {
            fragments.push(fragment);
        }

        if fragments.is_empty() {
            return Err(HpdError::contract(format!(
                "criteria produce no filter for scope {:?}",
                scope
            )));
        }

        let (ou, depth) = route(scope);
        let base_dn = match ou {
            Some(ou) => format!("ou={},{}", ou, endpoint.base_dn),
            None => endpoint.base_dn.clone(),
        };

        Ok(CompiledQuery {
            scope,
            base_dn,
            depth,
            fragments,
        })
    }

    /// Name text wins; last/first name are used only when it is blank
    fn name_fragments(criteria: &SearchCriteria, fragments: &mut Vec<Filter>) {
        let mode = criteria.name_match;
        if let Some(text) = non_blank(&criteria.name_text) {
            let attributes: &[&str] = match criteria.scope {
                SearchScope::IndividualProvidersOnly => &["sn", "givenName", "displayName"],
                SearchScope::OrgsOnly => &["o", "displayName"],
                SearchScope::AllEntities => &["displayName", "o", "sn"],
                _ => &[],
            };
            if !attributes.is_empty() {
                fragments.push(Filter::any_of(
                    attributes.iter().map(|a| Filter::matching(mode, a, text)).collect(),
                ));
            }
            return;
        }

        if let Some(last) = non_blank(&criteria.last_name) {
            fragments.push(Filter::matching(mode, "sn", last));
        }
        if let Some(first) = non_blank(&criteria.first_name) {
            fragments.push(Filter::matching(mode, "givenName", first));
        }
    }

    fn dn_fragment(criteria: &SearchCriteria, endpoint: &DirectoryEndpoint) -> Result<Option<Filter>, HpdError> {
        let scope = criteria.scope;
        let dns: Vec<String> = criteria
            .dn_selector
            .as_ref()
            .map(|s| s.dns().to_vec())
            .unwrap_or_default();

        let fragments: Vec<Filter> = match (scope, &criteria.dn_selector) {
            (SearchScope::CredentialsOnly, _) => Self::ids_from_dns(&dns, "hpdCredentialId", dn::id_from_dn),
            (SearchScope::HasAProviderRelationshipsOnly, _) => {
                dns.iter().map(|d| Filter::equality("hpdHasAProvider", d.as_str())).collect()
            }
            (SearchScope::HasAnOrgRelationshipsOnly | SearchScope::ProvidersAffiliatedToOrg, _) => {
                let mut org_dns = dns;
                if let Some(uid) = non_blank(&criteria.uid) {
                    org_dns.push(dn::organization_dn(&endpoint.id, uid, &endpoint.base_dn));
                }
                crate::criteria::dedupe_dns(org_dns)
                    .iter()
                    .map(|d| Filter::equality("hpdHasAnOrg", d.as_str()))
                    .collect()
            }
            (SearchScope::ServicesOnly, _) => Self::ids_from_dns(&dns, "hpdServiceId", dn::id_from_dn),
            (
                SearchScope::OrgsOnly | SearchScope::IndividualProvidersOnly,
                Some(DnSelector::Organizations(_) | DnSelector::IndividualProviders(_)),
            ) => Self::ids_from_dns(&dns, "uid", dn::qualified_uid_from_dn),
            _ => return Ok(None),
        };

        if fragments.is_empty() {
            return Err(HpdError::contract(format!(
                "scope {:?} requires a non-empty DN list",
                scope
            )));
        }
        Ok(Some(Filter::any_of(fragments)))
    }

    fn ids_from_dns(dns: &[String], attribute: &str, extract: fn(&str) -> Option<&str>) -> Vec<Filter> {
        dns.iter()
            .filter_map(|d| match extract(d) {
                Some(id) => Some(Filter::equality(attribute, id)),
                None => {
                    warn!("Ignoring DN without an id: '{}'", d);
                    None
                }
            })
            .collect()
    }

    /// Human readable description of the criteria, for logs
    pub fn summary(criteria: &SearchCriteria) -> String {
        let mut parts: Vec<String> = criteria
            .text_fields()
            .into_iter()
            .map(|(label, value)| match label {
                "telephone" | "fax" => format!(
                    "{}={}",
                    label,
                    to_protocol_telephone(value).unwrap_or_else(|| value.to_string())
                ),
                _ => format!("{}={}", label, value),
            })
            .collect();

        if non_blank(&criteria.name_text).is_some()
            || non_blank(&criteria.last_name).is_some()
            || non_blank(&criteria.first_name).is_some()
        {
            parts.push(format!("name match={:?}", criteria.name_match));
        }
        if matches!(criteria.service_match.0, MatchMode::Exists | MatchMode::NotExists) {
            parts.push(format!("service address {:?}", criteria.service_match.0));
        }
        if let Some(selector) = &criteria.dn_selector {
            parts.push(format!("{} {}", selector.dns().len(), selector.label()));
        }

        format!("{:?}: {}", criteria.scope, parts.join(", "))
    }
}

/// Format a phone number the way directories store it.
///
/// 7 digits become `NNN-NNNN`; otherwise `+1 NNN NNN-NNNN` with any extra
/// digits appended after a space. A leading `1` is dropped from numbers
/// longer than 10 digits.
pub fn to_protocol_telephone(input: &str) -> Option<String> {
    let mut digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if digits.len() > 10 && digits.starts_with('1') {
        digits.remove(0);
    }
    if digits.len() == 7 {
        return Some(format!("{}-{}", &digits[..3], &digits[3..]));
    }

    let len = digits.len();
    let mut out = String::from("+1 ");
    out.push_str(&digits[..len.min(3)]);
    if len > 3 {
        out.push(' ');
        out.push_str(&digits[3..len.min(6)]);
    }
    if len > 6 {
        out.push('-');
        out.push_str(&digits[6..len.min(10)]);
    }
    if len > 10 {
        out.push(' ');
        out.push_str(&digits[10..]);
    }
    Some(out)
}
