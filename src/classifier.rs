//! Buckets parsed entries into entities, relationships, services and credentials

use crate::attributes::{AttributeBag, RawRecord};
use crate::dn;
use crate::error::EntryError;
use crate::response::BatchResponse;
use crate::types::{
    Address, AddressKind, Contact, ContactKind, Credential, ElectronicService, Entity, EntityKind,
    Relationship, Specialty,
};
use tracing::{debug, warn};

const ORG_OBJECT_CLASS: &str = "hcRegulatedOrganization";
const PROVIDER_OBJECT_CLASS: &str = "HPDProvider";

/// Typed records from one response
#[derive(Debug, Clone, Default)]
pub struct ClassifiedResponse {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub services: Vec<ElectronicService>,
    pub credentials: Vec<Credential>,
}

impl ClassifiedResponse {
    pub fn total(&self) -> usize {
        self.entities.len() + self.relationships.len() + self.services.len() + self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

pub struct ResponseClassifier<'a> {
    directory_id: &'a str,
}

impl<'a> ResponseClassifier<'a> {
    pub fn new(directory_id: &'a str) -> Self {
        Self { directory_id }
    }

    /// Classify every entry; entries that cannot be built are logged and skipped
    pub fn classify(&self, batch: BatchResponse) -> ClassifiedResponse {
        let mut out = ClassifiedResponse::default();

        for record in batch.records {
            let mut matched = false;

            if dn::has_ou(&record.dn, dn::CREDENTIAL_OU) {
                matched = true;
                out.credentials.push(credential_from_record(&record));
            }
            if dn::has_ou(&record.dn, dn::INDIVIDUAL_OU) || dn::has_ou(&record.dn, dn::ORG_OU) {
                matched = true;
                match self.entity_from_record(&record) {
                    Ok(entity) => out.entities.push(entity),
                    Err(e) => warn!("Skipping entry in directory {}: {}", self.directory_id, e),
                }
            }
            if dn::has_ou(&record.dn, dn::RELATIONSHIP_OU) {
                matched = true;
                match relationship_from_record(&record) {
                    Ok(rel) => out.relationships.push(rel),
                    Err(e) => warn!("Skipping entry in directory {}: {}", self.directory_id, e),
                }
            }
            if dn::has_ou(&record.dn, dn::SERVICE_OU) {
                matched = true;
                out.services.push(service_from_record(&record));
            }

            if !matched {
                debug!("Ignoring unclassified entry '{}'", record.dn);
            }
        }

        out
    }

    /// Build an organization or individual from its attributes
    pub fn entity_from_record(&self, record: &RawRecord) -> Result<Entity, EntryError> {
        let attrs = &record.attributes;

        let uid = attrs
            .first("uid")
            .or_else(|| attrs.first("hpdOrgId"))
            .map(str::trim)
            .unwrap_or_default();
        let parts: Vec<&str> = uid.split(':').filter(|p| !p.is_empty()).collect();
        let (authority_id, entity_uid) = match parts.as_slice() {
            [] => {
                let known_class = attrs.has_value("objectClass", PROVIDER_OBJECT_CLASS)
                    || attrs.has_value("objectClass", ORG_OBJECT_CLASS);
                return Err(if known_class {
                    EntryError::MissingUid(record.dn.clone())
                } else {
                    EntryError::NotAnEntity(record.dn.clone())
                });
            }
            [only] => (self.directory_id.to_string(), only.to_string()),
            [authority, id, ..] => (authority.to_string(), id.to_string()),
        };

        let text = |name: &str| attrs.first(name).map(str::to_string);
        let is_org = attrs.has_value("objectClass", ORG_OBJECT_CLASS)
            || attrs.first("o").map(|o| !o.trim().is_empty()).unwrap_or(false);

        let kind = if is_org {
            EntityKind::Organization { org_name: text("o") }
        } else {
            EntityKind::Individual {
                given_name: text("givenName"),
                surname: text("sn"),
                middle_name: text("initials"),
                title: text("title"),
            }
        };

        let display_name = text("displayName").or_else(|| text("o")).or_else(|| text("cn"));

        Ok(Entity {
            dn: record.dn.clone(),
            directory_id: self.directory_id.to_string(),
            authority_id,
            entity_uid,
            display_name,
            status: text("hpdProviderStatus"),
            profession: text("hcProfession"),
            kind,
            contacts: entity_contacts(attrs),
            addresses: addresses(attrs),
            specialties: attrs.values("hcSpecialization").iter().map(|s| Specialty::parse(s)).collect(),
            service_dns: crate::criteria::dedupe_dns(attrs.values("hpdHasAService")),
            credential_dns: crate::criteria::dedupe_dns(attrs.values("hpdCredential")),
            services: Vec::new(),
            credentials: Vec::new(),
            relationships: Vec::new(),
            attributes: attrs.clone(),
        })
    }
}

fn contacts_from(attrs: &AttributeBag, sources: &[(&str, ContactKind)]) -> Vec<Contact> {
    sources
        .iter()
        .flat_map(|(name, kind)| attrs.values(name).iter().map(move |v| Contact::new(*kind, v.trim())))
        .collect()
}

fn entity_contacts(attrs: &AttributeBag) -> Vec<Contact> {
    contacts_from(
        attrs,
        &[
            ("telephoneNumber", ContactKind::Telephone),
            ("facsimileTelephoneNumber", ContactKind::Fax),
            ("mail", ContactKind::Email),
            ("hpdMedicalRecordsDeliveryEmailAddress", ContactKind::DirectAddress),
        ],
    )
}

fn addresses(attrs: &AttributeBag) -> Vec<Address> {
    [
        ("hpdProviderBillingAddress", AddressKind::Billing),
        ("hpdProviderMailingAddress", AddressKind::Mailing),
        ("hpdProviderPracticeAddress", AddressKind::Practice),
    ]
    .into_iter()
    .flat_map(|(name, kind)| attrs.values(name).iter().filter_map(move |raw| Address::parse(kind, raw)))
    .collect()
}

pub fn relationship_from_record(record: &RawRecord) -> Result<Relationship, EntryError> {
    let attrs = &record.attributes;
    let provider_dn = attrs
        .first("hpdHasAProvider")
        .map(str::to_string)
        .ok_or_else(|| EntryError::MissingReference {
            dn: record.dn.clone(),
            attribute: "hpdHasAProvider",
        })?;
    let org_dn = attrs.first("hpdHasAnOrg").map(str::to_string);
    let org_id = org_dn.as_deref().and_then(dn::unqualified_uid_from_dn).map(str::to_string);

    let contacts = contacts_from(
        attrs,
        &[
            ("telephoneNumber", ContactKind::Telephone),
            ("mobile", ContactKind::Telephone),
            ("facsimileTelephoneNumber", ContactKind::Fax),
            ("mail", ContactKind::Email),
        ],
    )
    .into_iter()
    .map(|mut contact| {
        contact.affiliated_org_id = org_id.clone();
        contact.affiliated_org_dn = org_dn.clone();
        contact
    })
    .collect();

    Ok(Relationship {
        dn: record.dn.clone(),
        member_id: attrs.first("hpdMemberId").map(str::to_string),
        org_dn,
        provider_dn,
        service_dns: crate::criteria::dedupe_dns(attrs.values("hpdHasAService")),
        contacts,
        related_org: None,
        services: Vec::new(),
    })
}

pub fn service_from_record(record: &RawRecord) -> ElectronicService {
    let attrs = &record.attributes;
    ElectronicService {
        dn: record.dn.clone(),
        service_id: attrs.first("hpdServiceId").map(str::to_string),
        address: attrs.first("hpdServiceAddress").map(str::to_string),
        integration_profile: attrs.first("hpdIntegrationProfile").map(str::to_string),
        security_profile: attrs.first("hpdSecurityProfile").map(str::to_string),
        certificate: None,
    }
}

pub fn credential_from_record(record: &RawRecord) -> Credential {
    let attrs = &record.attributes;
    Credential {
        dn: record.dn.clone(),
        credential_id: attrs.first("hpdCredentialId").map(str::to_string),
        name: attrs.first("credentialName").map(str::to_string),
        number: attrs.first("credentialNumber").map(str::to_string),
        credential_type: attrs.first("credentialType").map(str::to_string),
        status: attrs.first("credentialStatus").map(str::to_string),
        description: attrs.first("credentialDescription").map(str::to_string),
    }
}
