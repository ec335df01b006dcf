//! Federated search engine: multi-phase search and weave per directory,
//! round-robin merge across directories.
//!
//! Per directory:
//! 1. Entity phase from the caller's criteria (affiliated-provider scope
//!    short-circuits into a provider search by DN)
//! 2. Relationship phase by entity DN, then org and service phases
//! 3. Credential phase
//!
//! Failures are isolated per directory. Only contract violations in the
//! caller's criteria are returned as `Err`.

use crate::classifier::{ClassifiedResponse, ResponseClassifier};
use crate::config::{ClientConfig, DirectoryEndpoint};
use crate::criteria::{dedupe_dns, DnSelector, MatchMode, SearchCriteria, SearchScope};
use crate::envelope::EnvelopeCodec;
use crate::error::{HpdError, ResultCode};
use crate::merge::RoundRobinMerger;
use crate::query::QueryCompiler;
use crate::response;
use crate::transport::{DirectoryTransport, HttpTransport};
use crate::types::{Credential, ElectronicService, Entity, Relationship, SearchOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Organization name used by [`OrchestrationEngine::ping_directory`]
pub const PING_ORG_NAME: &str = "Mercy Hospital";

pub type SharedEngine = Arc<OrchestrationEngine>;

pub struct OrchestrationEngine {
    config: ClientConfig,
    transport: Arc<dyn DirectoryTransport>,
    codec: EnvelopeCodec,
}

impl OrchestrationEngine {
    pub fn new(config: ClientConfig, transport: Arc<dyn DirectoryTransport>) -> SharedEngine {
        let codec = EnvelopeCodec::new(config.envelope_template.clone());
        Arc::new(Self {
            config,
            transport,
            codec,
        })
    }

    /// Engine talking HTTP to real directories
    pub fn new_http(config: ClientConfig) -> Result<SharedEngine, HpdError> {
        let transport = HttpTransport::with_connect_timeout(config.connect_timeout())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Active directories in configuration order
    pub fn list_directories(&self) -> Vec<&DirectoryEndpoint> {
        self.config.directories().iter().filter(|d| d.active).collect()
    }

    /// Case-insensitive lookup
    pub fn get_directory(&self, id: &str) -> Option<&DirectoryEndpoint> {
        self.config.directory(id)
    }

    /// Search several directories and merge their entities round-robin
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        directory_ids: &[String],
    ) -> Result<SearchOutcome, HpdError> {
        let directory_ids = dedupe_dns(directory_ids);
        if directory_ids.is_empty() {
            let err = HpdError::NoDirectorySpecified;
            return Ok(SearchOutcome::empty(err.code(), err.to_string()));
        }
        if !criteria.has_criteria() {
            let err = HpdError::NoSearchCriteria;
            return Ok(SearchOutcome::empty(err.code(), err.to_string()));
        }
        QueryCompiler::validate(criteria)?;

        info!(
            "Federated search across {} directories: {}",
            directory_ids.len(),
            QueryCompiler::summary(criteria)
        );

        let tasks = directory_ids
            .iter()
            .map(|id| self.search_validated(criteria, id));
        let results = futures::future::join_all(tasks).await;

        let merger = RoundRobinMerger::new();
        let mut outcome = SearchOutcome::empty(ResultCode::Success, String::new());
        let mut failure: Option<(ResultCode, String)> = None;

        for (id, result) in directory_ids.iter().zip(results) {
            outcome
                .directory_results
                .insert(id.clone(), result.directory_result(id));

            if !result.is_success() {
                warn!("Directory {} failed: {} ({})", id, result.message, result.code);
                failure = Some((result.code, result.message));
                continue;
            }

            merger.add_source(result.entities);
            outcome.relationships.extend(result.relationships);
            outcome.services.extend(result.services);
            outcome.credentials.extend(result.credentials);
        }

        outcome.entities = merger.into_vec();

        match failure {
            Some((code, message)) => {
                outcome.code = code;
                outcome.message = message;
            }
            None => {
                outcome.message = format!(
                    "Search returned {} entities from {} directories",
                    outcome.entities.len(),
                    directory_ids.len()
                );
            }
        }

        info!(
            "Federated search complete: {} entities, {} relationships, {} services, {} credentials ({})",
            outcome.entities.len(),
            outcome.relationships.len(),
            outcome.services.len(),
            outcome.credentials.len(),
            outcome.code
        );

        Ok(outcome)
    }

    /// Search one directory. Only invalid caller criteria are returned as
    /// `Err`; every failure after validation becomes a failed outcome.
    pub async fn search_directory(
        &self,
        criteria: &SearchCriteria,
        directory_id: &str,
    ) -> Result<SearchOutcome, HpdError> {
        if !criteria.has_criteria() {
            return Ok(failed(HpdError::NoSearchCriteria));
        }
        QueryCompiler::validate(criteria)?;
        Ok(self.search_validated(criteria, directory_id).await)
    }

    async fn search_validated(&self, criteria: &SearchCriteria, directory_id: &str) -> SearchOutcome {
        let endpoint = match self.config.directory(directory_id) {
            Some(endpoint) if endpoint.active => endpoint,
            Some(endpoint) => return failed(HpdError::DirectoryInactive(endpoint.id.clone())),
            None => return failed(HpdError::DirectoryNotFound(directory_id.to_string())),
        };

        // Later phases are built from directory data, so even a contract
        // error here belongs to this directory alone.
        match self.weave(endpoint, criteria).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    "Search of {} ({}) failed: {}",
                    endpoint.name, endpoint.id, err
                );
                failed(err)
            }
        }
    }

    /// Connectivity check: an exact organization-name search
    pub async fn ping_directory(&self, directory_id: &str) -> Result<SearchOutcome, HpdError> {
        let criteria = SearchCriteria {
            scope: SearchScope::OrgsOnly,
            name_match: MatchMode::Equality,
            name_text: Some(PING_ORG_NAME.to_string()),
            ..Default::default()
        };
        self.search_directory(&criteria, directory_id).await
    }

    /// Compile, send, normalize, parse and classify one search
    async fn run_phase(
        &self,
        endpoint: &DirectoryEndpoint,
        criteria: &SearchCriteria,
    ) -> Result<ClassifiedResponse, HpdError> {
        let query = QueryCompiler::compile(criteria, endpoint)?;
        let envelope = self.codec.encode(&query, endpoint);

        info!(
            "Searching {} ({}) at {} [auth={}] {}",
            endpoint.name,
            endpoint.id,
            endpoint.service_url,
            endpoint.auth.label(),
            QueryCompiler::summary(criteria)
        );
        debug!("Envelope {}: {}", envelope.message_id, envelope.body);

        let timeout = endpoint.read_timeout(self.config.default_request_timeout());
        let raw = self.transport.exchange(endpoint, &envelope.body, timeout).await?;
        let batch = response::decode(&raw)?;
        let classified = ResponseClassifier::new(&endpoint.id).classify(batch);

        debug!(
            "{:?} search of {} returned {} entities, {} relationships, {} services, {} credentials",
            criteria.scope,
            endpoint.id,
            classified.entities.len(),
            classified.relationships.len(),
            classified.services.len(),
            classified.credentials.len()
        );
        Ok(classified)
    }

    async fn weave(
        &self,
        endpoint: &DirectoryEndpoint,
        criteria: &SearchCriteria,
    ) -> Result<SearchOutcome, HpdError> {
        let found = self.run_phase(endpoint, criteria).await?;

        if criteria.scope == SearchScope::ProvidersAffiliatedToOrg {
            let provider_dns = addressable(
                dedupe_dns(found.relationships.iter().map(|r| r.provider_dn.as_str())),
                &endpoint.id,
                "provider",
            );
            if provider_dns.is_empty() {
                return Ok(succeeded(endpoint, ClassifiedResponse::default()));
            }
            let providers = self
                .run_phase(
                    endpoint,
                    &SearchCriteria::by_dns(
                        SearchScope::IndividualProvidersOnly,
                        DnSelector::IndividualProviders(provider_dns),
                    ),
                )
                .await?;
            return Ok(succeeded(endpoint, providers));
        }

        if found.is_empty() {
            return Ok(succeeded(endpoint, ClassifiedResponse::default()));
        }
        // Relationship, service and credential searches have nothing to weave.
        if found.entities.is_empty() || !weaves(criteria.scope) {
            return Ok(succeeded(endpoint, found));
        }

        let mut entities = found.entities;
        let mut links = WeaveLinks::default();
        for entity in &entities {
            for service_dn in &entity.service_dns {
                links.add_service(service_dn, Some(&entity.entity_uid), None);
            }
        }

        // Relationships owned by the entities found.
        let entity_dns = dedupe_dns(entities.iter().map(|e| e.dn.as_str()));
        let relationships = self
            .run_phase(
                endpoint,
                &SearchCriteria::by_dns(
                    SearchScope::HasAProviderRelationshipsOnly,
                    DnSelector::RelationshipProviders(entity_dns),
                ),
            )
            .await?
            .relationships;

        for relationship in relationships {
            if let Some(org_dn) = &relationship.org_dn {
                push_unique(&mut links.org_dns, org_dn);
            }
            let owner_uid = relationship.provider_uid().map(str::to_string);
            for service_dn in &relationship.service_dns {
                links.add_service(service_dn, owner_uid.as_deref(), Some(&relationship.dn));
            }

            match owner_uid.as_deref().and_then(|uid| find_entity(&mut entities, uid)) {
                Some(owner) => {
                    owner.contacts.extend(relationship.contacts.iter().cloned());
                    owner.relationships.push(relationship);
                }
                None => warn!(
                    "No entity in {} owns relationship {}",
                    endpoint.id, relationship.dn
                ),
            }
        }

        // Organizations referenced by those relationships.
        let org_dns = addressable(std::mem::take(&mut links.org_dns), &endpoint.id, "organization");
        if !org_dns.is_empty() {
            let orgs = self
                .run_phase(
                    endpoint,
                    &SearchCriteria::by_dns(
                        SearchScope::OrgsOnly,
                        DnSelector::Organizations(org_dns),
                    ),
                )
                .await?
                .entities;
            for org in &orgs {
                attach_org(&mut entities, org);
            }
        }
        for entity in &entities {
            for rel in entity.relationships.iter().filter(|r| r.related_org.is_none()) {
                warn!(
                    "Relationship {} of {} has no related organization",
                    rel.dn,
                    entity.qualified_uid()
                );
            }
        }

        // Electronic services of entities and relationships.
        let mut services = Vec::new();
        let service_dns = addressable(std::mem::take(&mut links.service_dns), &endpoint.id, "service");
        if !service_dns.is_empty() {
            services = self
                .run_phase(
                    endpoint,
                    &SearchCriteria::by_dns(
                        SearchScope::ServicesOnly,
                        DnSelector::Services(service_dns),
                    ),
                )
                .await?
                .services;
            for service in &services {
                attach_service(&mut entities, &links, service, &endpoint.id);
            }
        }

        // Credentials referenced by the entities.
        let mut credential_owner: HashMap<String, String> = HashMap::new();
        let mut credential_dns = Vec::new();
        for entity in &entities {
            for dn in &entity.credential_dns {
                push_unique(&mut credential_dns, dn);
                credential_owner
                    .entry(dn.to_ascii_lowercase())
                    .or_insert_with(|| entity.entity_uid.clone());
            }
        }
        let mut credentials = Vec::new();
        let credential_dns = addressable(credential_dns, &endpoint.id, "credential");
        if !credential_dns.is_empty() {
            credentials = self
                .run_phase(
                    endpoint,
                    &SearchCriteria::by_dns(
                        SearchScope::CredentialsOnly,
                        DnSelector::Credentials(credential_dns),
                    ),
                )
                .await?
                .credentials;
            for credential in &credentials {
                attach_credential(&mut entities, &credential_owner, credential, &endpoint.id);
            }
        }

        let relationships: Vec<Relationship> = entities
            .iter()
            .flat_map(|e| e.relationships.iter().cloned())
            .collect();

        Ok(succeeded(
            endpoint,
            ClassifiedResponse {
                entities,
                relationships,
                services,
                credentials,
            },
        ))
    }
}

/// DN bookkeeping gathered while weaving one directory
#[derive(Default)]
struct WeaveLinks {
    org_dns: Vec<String>,
    service_dns: Vec<String>,
    /// lower-cased service DN → owning entity UID
    service_owner: HashMap<String, String>,
    /// lower-cased service DN → owning relationship DN
    service_relationship: HashMap<String, String>,
}

impl WeaveLinks {
    fn add_service(&mut self, service_dn: &str, owner_uid: Option<&str>, relationship_dn: Option<&str>) {
        push_unique(&mut self.service_dns, service_dn);
        let key = service_dn.trim().to_ascii_lowercase();
        if let Some(uid) = owner_uid {
            self.service_owner
                .entry(key.clone())
                .or_insert_with(|| uid.to_string());
        }
        if let Some(rel_dn) = relationship_dn {
            self.service_relationship
                .entry(key)
                .or_insert_with(|| rel_dn.to_string());
        }
    }
}

/// Scopes whose results are entities that get relationships, services and
/// credentials attached
fn weaves(scope: SearchScope) -> bool {
    matches!(
        scope,
        SearchScope::AllEntities | SearchScope::IndividualProvidersOnly | SearchScope::OrgsOnly
    )
}

/// Keep references whose first RDN carries an id; a search needs one per DN
fn addressable(dns: Vec<String>, directory_id: &str, kind: &str) -> Vec<String> {
    dns.into_iter()
        .filter(|dn| {
            let usable = crate::dn::id_from_dn(dn).is_some();
            if !usable {
                warn!("Ignoring {} reference '{}' from {}: no id in DN", kind, dn, directory_id);
            }
            usable
        })
        .collect()
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !list.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        list.push(value.to_string());
    }
}

fn find_entity<'a>(entities: &'a mut [Entity], uid: &str) -> Option<&'a mut Entity> {
    entities.iter_mut().find(|e| e.entity_uid.eq_ignore_ascii_case(uid))
}

fn find_relationship<'a>(entities: &'a mut [Entity], dn: &str) -> Option<&'a mut Relationship> {
    entities
        .iter_mut()
        .flat_map(|e| e.relationships.iter_mut())
        .find(|r| r.dn.eq_ignore_ascii_case(dn))
}

fn attach_org(entities: &mut [Entity], org: &Entity) {
    let org_name = org.name();
    let backfill = |contact: &mut crate::types::Contact| {
        let matches = contact
            .affiliated_org_dn
            .as_deref()
            .map(|dn| dn.eq_ignore_ascii_case(&org.dn))
            .unwrap_or(false);
        if matches {
            contact.affiliated_org_id = Some(org.entity_uid.clone());
            contact.affiliated_org_name = Some(org_name.clone());
        }
    };

    for entity in entities.iter_mut() {
        entity.contacts.iter_mut().for_each(backfill);
        for rel in entity.relationships.iter_mut() {
            let related = rel
                .org_dn
                .as_deref()
                .map(|dn| dn.eq_ignore_ascii_case(&org.dn))
                .unwrap_or(false);
            if related {
                rel.related_org = Some(Box::new(org.clone()));
            }
            rel.contacts.iter_mut().for_each(backfill);
        }
    }
}

fn attach_service(entities: &mut [Entity], links: &WeaveLinks, service: &ElectronicService, directory_id: &str) {
    let key = service.dn.trim().to_ascii_lowercase();

    match links
        .service_owner
        .get(&key)
        .and_then(|uid| find_entity(entities, uid))
    {
        Some(owner) => owner.services.push(service.clone()),
        None => warn!("No entity in {} owns service {}", directory_id, service.dn),
    }

    if let Some(rel_dn) = links.service_relationship.get(&key) {
        match find_relationship(entities, rel_dn) {
            Some(rel) => rel.services.push(service.clone()),
            None => warn!("Relationship {} for service {} not found", rel_dn, service.dn),
        }
    }
}

fn attach_credential(
    entities: &mut [Entity],
    owners: &HashMap<String, String>,
    credential: &Credential,
    directory_id: &str,
) {
    match owners
        .get(&credential.dn.trim().to_ascii_lowercase())
        .and_then(|uid| find_entity(entities, uid))
    {
        Some(owner) => owner.credentials.push(credential.clone()),
        None => warn!("No entity in {} owns credential {}", directory_id, credential.dn),
    }
}

fn failed(err: HpdError) -> SearchOutcome {
    SearchOutcome::empty(err.code(), err.to_string())
}

fn succeeded(endpoint: &DirectoryEndpoint, found: ClassifiedResponse) -> SearchOutcome {
    SearchOutcome {
        code: ResultCode::Success,
        message: format!("Found {} entities in {}", found.entities.len(), endpoint.name),
        entities: found.entities,
        relationships: found.relationships,
        services: found.services,
        credentials: found.credentials,
        directory_results: Default::default(),
    }
}
