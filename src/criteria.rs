//! Typed search criteria accepted by the engine

use serde::{Deserialize, Serialize};

/// Which part of the directory tree a search targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchScope {
    #[default]
    AllEntities,
    OrgsOnly,
    IndividualProvidersOnly,
    CredentialsOnly,
    HasAProviderRelationshipsOnly,
    HasAnOrgRelationshipsOnly,
    ServicesOnly,
    ProvidersAffiliatedToOrg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    Equality,
    #[default]
    Contains,
    StartsWith,
    Exists,
    NotExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceProfile {
    #[default]
    DirectProjectSmtp,
    MllpHl7V2,
    XdsProvideAndRegister,
    XdrProvideAndRegister,
    XcaQueryRetrieve,
}

/// Search by an explicit list of DNs. Only one list can be active per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "dns")]
pub enum DnSelector {
    Credentials(Vec<String>),
    RelationshipProviders(Vec<String>),
    RelationshipOrgs(Vec<String>),
    Organizations(Vec<String>),
    IndividualProviders(Vec<String>),
    Services(Vec<String>),
}

impl DnSelector {
    pub fn dns(&self) -> &[String] {
        match self {
            DnSelector::Credentials(dns)
            | DnSelector::RelationshipProviders(dns)
            | DnSelector::RelationshipOrgs(dns)
            | DnSelector::Organizations(dns)
            | DnSelector::IndividualProviders(dns)
            | DnSelector::Services(dns) => dns,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DnSelector::Credentials(_) => "credential DNs",
            DnSelector::RelationshipProviders(_) => "relationship provider DNs",
            DnSelector::RelationshipOrgs(_) => "relationship org DNs",
            DnSelector::Organizations(_) => "organization DNs",
            DnSelector::IndividualProviders(_) => "individual provider DNs",
            DnSelector::Services(_) => "service DNs",
        }
    }

    /// Scopes this DN list can be combined with
    pub fn fits(&self, scope: SearchScope) -> bool {
        matches!(
            (self, scope),
            (DnSelector::Credentials(_), SearchScope::CredentialsOnly)
                | (DnSelector::RelationshipProviders(_), SearchScope::HasAProviderRelationshipsOnly)
                | (DnSelector::RelationshipOrgs(_), SearchScope::HasAnOrgRelationshipsOnly)
                | (DnSelector::RelationshipOrgs(_), SearchScope::ProvidersAffiliatedToOrg)
                | (DnSelector::Organizations(_), SearchScope::OrgsOnly)
                | (DnSelector::IndividualProviders(_), SearchScope::IndividualProvidersOnly)
                | (DnSelector::Services(_), SearchScope::ServicesOnly)
        )
    }
}

/// Build a DN list, dropping blanks and case-insensitive duplicates
pub fn dedupe_dns<I, S>(dns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for dn in dns {
        let dn = dn.as_ref().trim();
        if dn.is_empty() || out.iter().any(|existing| existing.eq_ignore_ascii_case(dn)) {
            continue;
        }
        out.push(dn.to_string());
    }
    out
}

/// What to look for. Constructed per call and not modified once handed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    pub scope: SearchScope,
    pub uid: Option<String>,
    pub name_match: MatchMode,
    pub name_text: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub npi: Option<String>,
    pub org_id: Option<String>,
    pub registered_name: Option<String>,
    pub description: Option<String>,
    pub gender: Option<String>,
    pub language_code: Option<String>,
    pub address_text: Option<String>,
    pub address_text2: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub specialization_text: Option<String>,
    pub specialization_code: Option<String>,
    pub fax_number: Option<String>,
    pub telephone_number: Option<String>,
    pub email: Option<String>,
    pub service_address: Option<String>,
    pub service_match: ServiceMatch,
    pub service_profile: ServiceProfile,
    pub dn_selector: Option<DnSelector>,
}

/// Match mode for the service address, defaulting to equality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceMatch(pub MatchMode);

impl Default for ServiceMatch {
    fn default() -> Self {
        ServiceMatch(MatchMode::Equality)
    }
}

/// Trimmed, non-blank view of an optional field
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SearchCriteria {
    pub fn new(scope: SearchScope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    /// Criteria that select entries of `scope` by DN
    pub fn by_dns(scope: SearchScope, selector: DnSelector) -> Self {
        Self {
            scope,
            dn_selector: Some(selector),
            ..Default::default()
        }
    }

    /// Free-text fields as `(label, value)`, blanks removed
    pub fn text_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("uid", &self.uid),
            ("name", &self.name_text),
            ("last name", &self.last_name),
            ("first name", &self.first_name),
            ("NPI", &self.npi),
            ("org id", &self.org_id),
            ("registered name", &self.registered_name),
            ("description", &self.description),
            ("gender", &self.gender),
            ("language", &self.language_code),
            ("address", &self.address_text),
            ("address 2", &self.address_text2),
            ("postal code", &self.postal_code),
            ("state", &self.state),
            ("specialization", &self.specialization_text),
            ("specialization code", &self.specialization_code),
            ("fax", &self.fax_number),
            ("telephone", &self.telephone_number),
            ("email", &self.email),
            ("service address", &self.service_address),
        ]
        .into_iter()
        .filter_map(|(label, value)| non_blank(value).map(|v| (label, v)))
        .collect()
    }

    /// True iff the criteria constrain the search at all
    pub fn has_criteria(&self) -> bool {
        !self.text_fields().is_empty()
            || self
                .dn_selector
                .as_ref()
                .map(|selector| !selector.dns().is_empty())
                .unwrap_or(false)
            || matches!(self.service_match.0, MatchMode::Exists | MatchMode::NotExists)
    }
}
