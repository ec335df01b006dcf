//! Typed directory records and search outcomes

use crate::attributes::AttributeBag;
use crate::error::ResultCode;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContactKind {
    Telephone,
    Fax,
    Email,
    DirectAddress,
}

/// A way to reach an entity, optionally scoped to one of its affiliations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub kind: ContactKind,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliated_org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliated_org_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliated_org_dn: Option<String>,
}

impl Contact {
    pub fn new(kind: ContactKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            affiliated_org_id: None,
            affiliated_org_name: None,
            affiliated_org_dn: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressKind {
    Practice,
    Mailing,
    Billing,
}

/// Postal address decoded from the `key=value$key=value` attribute form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    pub kind: AddressKind,
    pub status: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub raw: String,
}

impl Address {
    /// Decode a directory address value. Returns `None` when nothing usable is present.
    pub fn parse(kind: AddressKind, raw: &str) -> Option<Self> {
        let separator = if !raw.contains('$') && raw.contains(',') { ',' } else { '$' };

        let mut address = Address {
            kind,
            status: None,
            line1: None,
            line2: None,
            city: None,
            state: None,
            postal_code: None,
            country: None,
            raw: raw.to_string(),
        };
        let mut street_name = None;
        let mut street_number = None;

        for pair in raw.split(separator) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let value = Some(value.to_string());
            match key.trim().to_ascii_lowercase().as_str() {
                "status" => address.status = value,
                "addr1" | "addr" => address.line1 = value,
                "addr2" => address.line2 = value,
                "city" => address.city = value,
                "postalcode" => address.postal_code = value,
                "state" => address.state = value,
                "country" | "countrycode" => address.country = value,
                "streetname" => street_name = value,
                "streetnumber" => street_number = value,
                _ => {}
            }
        }

        if address.line1.is_none() {
            let street = [street_number, street_name]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if !street.is_empty() {
                address.line1 = Some(street);
            }
        }

        let usable = address.line1.is_some()
            || address.city.is_some()
            || address.postal_code.is_some()
            || address.state.is_some();
        usable.then_some(address)
    }

    /// `line1 line2 city, state postal` with absent parts omitted
    pub fn full_address(&self) -> String {
        let mut out = String::new();
        for part in [&self.line1, &self.line2, &self.city].into_iter().flatten() {
            out.push_str(part);
            out.push(' ');
        }
        let mut out = out.trim_end().to_string();
        if self.state.is_some() || self.postal_code.is_some() {
            if !out.is_empty() {
                out.push(',');
            }
            for part in [&self.state, &self.postal_code].into_iter().flatten() {
                out.push(' ');
                out.push_str(part);
            }
        }
        out.trim().to_string()
    }
}

/// Specialization in `oid:name:code[:label]` form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Specialty {
    pub raw: String,
    pub oid: Option<String>,
    pub name: String,
    pub code: Option<String>,
    pub label: Option<String>,
}

impl Specialty {
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() > 2 {
            let code = parts[2].to_string();
            let label = parts.get(3).map(|l| l.to_string()).unwrap_or_else(|| code.clone());
            Self {
                raw: raw.to_string(),
                oid: Some(parts[0].to_string()),
                name: parts[1].to_string(),
                code: Some(code),
                label: Some(label),
            }
        } else {
            Self {
                raw: raw.to_string(),
                oid: None,
                name: raw.to_string(),
                code: None,
                label: None,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectronicService {
    pub dn: String,
    pub service_id: Option<String>,
    pub address: Option<String>,
    pub integration_profile: Option<String>,
    pub security_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub dn: String,
    pub credential_id: Option<String>,
    pub name: Option<String>,
    pub number: Option<String>,
    pub credential_type: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
}

/// Membership of a provider in an organization
#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub dn: String,
    pub member_id: Option<String>,
    pub org_dn: Option<String>,
    pub provider_dn: String,
    pub service_dns: Vec<String>,
    pub contacts: Vec<Contact>,
    /// Set during weaving when the org phase returns the referenced organization
    pub related_org: Option<Box<Entity>>,
    pub services: Vec<ElectronicService>,
}

impl Relationship {
    /// Entity part of the provider's qualified UID
    pub fn provider_uid(&self) -> Option<&str> {
        crate::dn::unqualified_uid_from_dn(&self.provider_dn)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum EntityKind {
    Organization {
        org_name: Option<String>,
    },
    Individual {
        given_name: Option<String>,
        surname: Option<String>,
        middle_name: Option<String>,
        title: Option<String>,
    },
}

/// A provider or organization found in one directory
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub dn: String,
    pub directory_id: String,
    pub authority_id: String,
    pub entity_uid: String,
    pub display_name: Option<String>,
    pub status: Option<String>,
    pub profession: Option<String>,
    pub kind: EntityKind,
    pub contacts: Vec<Contact>,
    pub addresses: Vec<Address>,
    pub specialties: Vec<Specialty>,
    pub service_dns: Vec<String>,
    pub credential_dns: Vec<String>,
    pub services: Vec<ElectronicService>,
    pub credentials: Vec<Credential>,
    pub relationships: Vec<Relationship>,
    #[serde(skip)]
    pub attributes: AttributeBag,
}

impl Entity {
    /// `authority:uid`
    pub fn qualified_uid(&self) -> String {
        format!("{}:{}", self.authority_id, self.entity_uid)
    }

    pub fn is_organization(&self) -> bool {
        matches!(self.kind, EntityKind::Organization { .. })
    }

    /// Organization name, or `surname, given` for individuals
    pub fn name(&self) -> String {
        match &self.kind {
            EntityKind::Organization { org_name } => org_name
                .clone()
                .or_else(|| self.display_name.clone())
                .unwrap_or_default(),
            EntityKind::Individual { given_name, surname, .. } => match (surname, given_name) {
                (Some(s), Some(g)) => format!("{}, {}", s, g),
                (Some(s), None) => s.clone(),
                (None, Some(g)) => g.clone(),
                (None, None) => self.display_name.clone().unwrap_or_default(),
            },
        }
    }

    /// Distinct organizations this entity is affiliated with through its relationships
    pub fn affiliated_orgs(&self) -> Vec<&Entity> {
        let mut seen = HashSet::new();
        let mut orgs = Vec::new();
        for rel in &self.relationships {
            match &rel.related_org {
                Some(org) => {
                    if seen.insert(org.dn.to_ascii_lowercase()) {
                        orgs.push(org.as_ref());
                    }
                }
                None => warn!(
                    "Relationship {} of {} has no related organization",
                    rel.dn,
                    self.qualified_uid()
                ),
            }
        }
        orgs
    }

    /// Practice address, then mailing, then billing
    pub fn primary_address(&self) -> Option<&Address> {
        [AddressKind::Practice, AddressKind::Mailing, AddressKind::Billing]
            .into_iter()
            .find_map(|kind| self.addresses.iter().find(|a| a.kind == kind))
    }

    pub fn contacts_of(&self, kind: ContactKind) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().filter(move |c| c.kind == kind)
    }
}

/// Diagnostic summary of one directory's part in a federated search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryResult {
    pub directory_id: String,
    pub code: ResultCode,
    pub message: String,
    pub entities: usize,
    pub relationships: usize,
    pub services: usize,
    pub credentials: usize,
}

/// Terminal result of a search, owned by the caller
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub code: ResultCode,
    pub message: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub services: Vec<ElectronicService>,
    pub credentials: Vec<Credential>,
    pub directory_results: BTreeMap<String, DirectoryResult>,
}

impl SearchOutcome {
    pub fn empty(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            entities: Vec::new(),
            relationships: Vec::new(),
            services: Vec::new(),
            credentials: Vec::new(),
            directory_results: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Summary row for the per-directory map
    pub fn directory_result(&self, directory_id: &str) -> DirectoryResult {
        DirectoryResult {
            directory_id: directory_id.to_string(),
            code: self.code,
            message: self.message.clone(),
            entities: self.entities.len(),
            relationships: self.relationships.len(),
            services: self.services.len(),
            credentials: self.credentials.len(),
        }
    }
}
