//! End-to-end tests for OrchestrationEngine

use crate::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;

const BASE: &str = "o=HPD";

// Needles identifying each phase in the outgoing envelope
const PROVIDER_PHASE: &str = "dn='ou=HCProfessional,";
const ORG_PHASE: &str = "dn='ou=HCRegulatedOrganization,";
const RELATIONSHIP_PHASE: &str = "name='hpdHasAProvider'";
const AFFILIATION_PHASE: &str = "name='hpdHasAnOrg'";
const SERVICE_PHASE: &str = "name='hpdServiceId'";
const CREDENTIAL_PHASE: &str = "name='hpdCredentialId'";

/// Helper to render one DSML search result entry
fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> String {
    let mut out = format!("<searchResultEntry dn='{}'>", dn);
    for (name, values) in attrs {
        out.push_str(&format!("<attr name='{}'>", name));
        for v in values.iter() {
            out.push_str(&format!("<value>{}</value>", v));
        }
        out.push_str("</attr>");
    }
    out.push_str("</searchResultEntry>");
    out
}

/// Helper to wrap entries in a SOAP batch response
fn batch(entries: &[String]) -> String {
    format!(
        "<?xml version='1.0'?><soap-env:Envelope xmlns:soap-env='http://schemas.xmlsoap.org/soap/envelope/'>\
         <soap-env:Body><batchResponse xmlns='urn:oasis:names:tc:DSML:2:0:core'>{}\
         <searchResultDone><resultCode code='0'/></searchResultDone></batchResponse>\
         </soap-env:Body></soap-env:Envelope>",
        entries.concat()
    )
}

fn provider(dir: &str, uid: &str, surname: &str, services: &[&str], credentials: &[&str]) -> String {
    let dn = format!("uid={}:{},ou=HCProfessional,{}", dir, uid, BASE);
    let qualified = format!("{}:{}", dir, uid);
    entry(
        &dn,
        &[
            ("objectClass", &["HPDProvider"]),
            ("uid", &[qualified.as_str()]),
            ("sn", &[surname]),
            ("givenName", &["Jane"]),
            ("hpdHasAService", services),
            ("hpdCredential", credentials),
        ],
    )
}

fn org(dir: &str, uid: &str, name: &str) -> String {
    let dn = format!("uid={}:{},ou=HCRegulatedOrganization,{}", dir, uid, BASE);
    let qualified = format!("{}:{}", dir, uid);
    entry(
        &dn,
        &[
            ("objectClass", &["hcRegulatedOrganization"]),
            ("uid", &[qualified.as_str()]),
            ("o", &[name]),
        ],
    )
}

fn provider_dn(dir: &str, uid: &str) -> String {
    format!("uid={}:{},ou=HCProfessional,{}", dir, uid, BASE)
}

fn org_dn(dir: &str, uid: &str) -> String {
    format!("uid={}:{},ou=HCRegulatedOrganization,{}", dir, uid, BASE)
}

fn service_dn(dir: &str, id: &str) -> String {
    format!("hpdServiceId={}:{},ou=HPDElectronicService,{}", dir, id, BASE)
}

fn credential_dn(dir: &str, id: &str) -> String {
    format!("hpdCredentialId={}:{},ou=HPDCredential,{}", dir, id, BASE)
}

fn membership(dir: &str, id: &str, provider: &str, org: Option<&str>, services: &[&str], phone: &str) -> String {
    let dn = format!("hpdMemberId={}:{},ou=HPDProviderMembership,{}", dir, id, BASE);
    let member_id = format!("{}:{}", dir, id);
    let org = org.map(|o| vec![o]).unwrap_or_default();
    entry(
        &dn,
        &[
            ("hpdMemberId", &[member_id.as_str()]),
            ("hpdHasAProvider", &[provider]),
            ("hpdHasAnOrg", org.as_slice()),
            ("hpdHasAService", services),
            ("telephoneNumber", &[phone]),
        ],
    )
}

fn service(dn: &str, address: &str) -> String {
    let id = dn.split(',').next().and_then(|r| r.split_once('=')).map(|(_, v)| v).unwrap_or_default();
    entry(
        dn,
        &[
            ("hpdServiceId", &[id]),
            ("hpdServiceAddress", &[address]),
            ("hpdIntegrationProfile", &["DirectProjectSMTP"]),
        ],
    )
}

fn credential(dn: &str, number: &str) -> String {
    let id = dn.split(',').next().and_then(|r| r.split_once('=')).map(|(_, v)| v).unwrap_or_default();
    entry(
        dn,
        &[
            ("hpdCredentialId", &[id]),
            ("credentialType", &["License"]),
            ("credentialNumber", &[number]),
        ],
    )
}

fn config(ids: &[&str]) -> ClientConfig {
    ids.iter().fold(ClientConfig::default(), |config, id| {
        config.with_directory(DirectoryEndpoint::new(
            *id,
            format!("Directory {}", id),
            BASE,
            format!("https://{}.hpd.example/query", id),
        ))
    })
}

fn smith_search() -> SearchCriteria {
    SearchCriteria {
        scope: SearchScope::IndividualProvidersOnly,
        name_text: Some("Smith".to_string()),
        ..Default::default()
    }
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Fully linked provider in directory A: one relationship to an org, one
/// service on each of entity and relationship, one credential
fn woven_directory_a() -> MockTransport {
    let svc_entity = service_dn("dirA", "svc1");
    let svc_rel = service_dn("dirA", "svc2");
    let cred = credential_dn("dirA", "cred1");
    let provider_dn = provider_dn("dirA", "100");
    let org_dn = org_dn("dirA", "500");

    MockTransport::new()
        .respond_for(
            "dirA",
            RELATIONSHIP_PHASE,
            batch(&[membership("dirA", "m1", &provider_dn, Some(org_dn.as_str()), &[svc_rel.as_str()], "555-1234")]),
        )
        .respond_for("dirA", ORG_PHASE, batch(&[org("dirA", "500", "Mercy Hospital")]))
        .respond_for(
            "dirA",
            SERVICE_PHASE,
            batch(&[
                service(&svc_entity, "jane@direct.mercy.example"),
                service(&svc_rel, "front-desk@direct.mercy.example"),
            ]),
        )
        .respond_for("dirA", CREDENTIAL_PHASE, batch(&[credential(&cred, "MD-42")]))
        .respond_for(
            "dirA",
            PROVIDER_PHASE,
            batch(&[provider("dirA", "100", "Smith", &[svc_entity.as_str()], &[cred.as_str()])]),
        )
}

#[tokio::test]
async fn test_zero_matches_skip_weaving() {
    let transport = Arc::new(MockTransport::new());
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

    let outcome = engine.search(&smith_search(), &ids(&["dirA"])).await.unwrap();

    assert_eq!(outcome.code, ResultCode::Success);
    assert!(outcome.entities.is_empty());
    assert!(outcome.relationships.is_empty());
    assert!(outcome.services.is_empty());
    assert!(outcome.credentials.is_empty());
    assert_eq!(transport.request_count(), 1, "only the entity phase should run");
}

#[tokio::test]
async fn test_full_weave() {
    let transport = Arc::new(woven_directory_a());
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

    let outcome = engine.search(&smith_search(), &ids(&["dirA"])).await.unwrap();
    assert!(outcome.is_success(), "{}", outcome.message);
    assert_eq!(transport.request_count(), 5);

    assert_eq!(outcome.entities.len(), 1);
    let smith = &outcome.entities[0];
    assert_eq!(smith.qualified_uid(), "dirA:100");
    assert_eq!(smith.name(), "Smith, Jane");

    // Relationship with its organization attached
    assert_eq!(smith.relationships.len(), 1);
    let rel = &smith.relationships[0];
    let related = rel.related_org.as_ref().expect("org attached");
    assert_eq!(related.name(), "Mercy Hospital");
    assert_eq!(smith.affiliated_orgs().len(), 1);

    // Relationship contacts copied to the entity with org id and name back-filled
    let phone = smith
        .contacts_of(ContactKind::Telephone)
        .find(|c| c.value == "555-1234")
        .expect("relationship phone");
    assert_eq!(phone.affiliated_org_id.as_deref(), Some("500"));
    assert_eq!(phone.affiliated_org_name.as_deref(), Some("Mercy Hospital"));
    assert_eq!(rel.contacts[0].affiliated_org_name.as_deref(), Some("Mercy Hospital"));

    // Services land on their owners
    let entity_services: Vec<_> = smith.services.iter().filter_map(|s| s.address.as_deref()).collect();
    assert!(entity_services.contains(&"jane@direct.mercy.example"));
    assert_eq!(rel.services.len(), 1);
    assert_eq!(rel.services[0].address.as_deref(), Some("front-desk@direct.mercy.example"));

    // Credentials
    assert_eq!(smith.credentials.len(), 1);
    assert_eq!(smith.credentials[0].number.as_deref(), Some("MD-42"));

    // Flattened lists
    assert_eq!(outcome.relationships.len(), 1);
    assert_eq!(outcome.services.len(), 2);
    assert_eq!(outcome.credentials.len(), 1);
    assert_eq!(outcome.directory_results["dirA"].entities, 1);
}

#[tokio::test]
async fn test_missing_org_is_not_fatal() {
    let provider_dn = provider_dn("dirA", "100");
    let transport = Arc::new(
        MockTransport::new()
            .respond_for(
                "dirA",
                RELATIONSHIP_PHASE,
                batch(&[membership("dirA", "m1", &provider_dn, Some(org_dn("dirA", "999").as_str()), &[], "555-0000")]),
            )
            .respond_for("dirA", PROVIDER_PHASE, batch(&[provider("dirA", "100", "Smith", &[], &[])])),
    );
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

    let outcome = engine.search(&smith_search(), &ids(&["dirA"])).await.unwrap();
    assert!(outcome.is_success());

    let smith = &outcome.entities[0];
    assert_eq!(smith.relationships.len(), 1);
    assert!(smith.relationships[0].related_org.is_none());
    assert!(smith.affiliated_orgs().is_empty());
    assert!(smith.credentials.is_empty());
    // entity, relationship and org phases; no services or credentials referenced
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test]
async fn test_one_directory_fails_other_succeeds() {
    let transport = Arc::new(
        MockTransport::new()
            .fail_for("dirB", || HpdError::ResponseTimeout("dirB read timed out".into()))
            .respond_for("dirA", PROVIDER_PHASE, batch(&[provider("dirA", "1", "Smith", &[], &[])])),
    );
    let engine = OrchestrationEngine::new(config(&["dirA", "dirB"]), transport);

    let outcome = engine.search(&smith_search(), &ids(&["dirA", "dirB"])).await.unwrap();

    assert_eq!(outcome.code, ResultCode::ResponseTimeout);
    assert_eq!(outcome.entities.len(), 1);
    assert_eq!(outcome.entities[0].directory_id, "dirA");

    let a = &outcome.directory_results["dirA"];
    let b = &outcome.directory_results["dirB"];
    assert_eq!(a.code, ResultCode::Success);
    assert_eq!(a.entities, 1);
    assert_eq!(b.code, ResultCode::ResponseTimeout);
    assert_eq!(b.entities, 0);
}

#[tokio::test]
async fn test_connect_timeout_is_reported_per_directory() {
    let transport = Arc::new(
        MockTransport::new()
            .fail_for("dirB", || HpdError::ConnectTimeout("https://dirB.hpd.example/query".into()))
            .respond_for("dirA", PROVIDER_PHASE, batch(&[provider("dirA", "1", "Smith", &[], &[])])),
    );
    let engine = OrchestrationEngine::new(config(&["dirA", "dirB"]), transport);

    let outcome = engine.search(&smith_search(), &ids(&["dirA", "dirB"])).await.unwrap();

    assert_eq!(outcome.code, ResultCode::ConnectTimeout);
    assert_eq!(outcome.entities.len(), 1);
    assert_eq!(outcome.directory_results["dirA"].code, ResultCode::Success);
    assert_eq!(outcome.directory_results["dirB"].code, ResultCode::ConnectTimeout);
    assert_eq!(outcome.directory_results["dirB"].code.as_i32(), -8);
}

#[tokio::test]
async fn test_unaddressable_reference_does_not_abort_federation() {
    // dirA lists a credential by bare id instead of by DN
    let transport = Arc::new(
        MockTransport::new()
            .respond_for("dirA", PROVIDER_PHASE, batch(&[provider("dirA", "1", "Smith", &[], &["1833"])]))
            .respond_for("dirB", PROVIDER_PHASE, batch(&[provider("dirB", "2", "Smith", &[], &[])])),
    );
    let engine = OrchestrationEngine::new(config(&["dirA", "dirB"]), transport.clone());

    let outcome = engine.search(&smith_search(), &ids(&["dirA", "dirB"])).await.unwrap();

    assert_eq!(outcome.code, ResultCode::Success);
    let mut dirs: Vec<_> = outcome.entities.iter().map(|e| e.directory_id.as_str()).collect();
    dirs.sort();
    assert_eq!(dirs, vec!["dirA", "dirB"]);
    assert_eq!(outcome.directory_results["dirA"].code, ResultCode::Success);
    assert_eq!(outcome.directory_results["dirB"].code, ResultCode::Success);
    assert!(outcome.credentials.is_empty());
    assert!(
        !transport.requests().iter().any(|r| r.envelope.contains(CREDENTIAL_PHASE)),
        "no credential search can be built from a bare id"
    );
}

#[tokio::test]
async fn test_record_scopes_return_their_records() {
    let provider_ref = provider_dn("dirA", "100");
    let org_ref = org_dn("dirA", "500");
    let svc = service_dn("dirA", "svc1");
    let cred = credential_dn("dirA", "cred1");
    let member = membership("dirA", "m1", &provider_ref, Some(org_ref.as_str()), &[], "555-1234");

    let cases = vec![
        (
            SearchScope::CredentialsOnly,
            DnSelector::Credentials(vec![cred.clone()]),
            CREDENTIAL_PHASE,
            credential(&cred, "MD-42"),
        ),
        (
            SearchScope::ServicesOnly,
            DnSelector::Services(vec![svc.clone()]),
            SERVICE_PHASE,
            service(&svc, "jane@direct.mercy.example"),
        ),
        (
            SearchScope::HasAProviderRelationshipsOnly,
            DnSelector::RelationshipProviders(vec![provider_ref.clone()]),
            RELATIONSHIP_PHASE,
            member.clone(),
        ),
        (
            SearchScope::HasAnOrgRelationshipsOnly,
            DnSelector::RelationshipOrgs(vec![org_ref.clone()]),
            AFFILIATION_PHASE,
            member.clone(),
        ),
    ];

    for (scope, selector, phase, record) in cases {
        let transport = Arc::new(MockTransport::new().respond_for("dirA", phase, batch(&[record])));
        let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

        let outcome = engine
            .search(&SearchCriteria::by_dns(scope, selector), &ids(&["dirA"]))
            .await
            .unwrap();

        assert_eq!(outcome.code, ResultCode::Success, "{:?}", scope);
        assert!(outcome.entities.is_empty(), "{:?}", scope);
        let counts = (
            outcome.relationships.len(),
            outcome.services.len(),
            outcome.credentials.len(),
        );
        let expected = match scope {
            SearchScope::CredentialsOnly => (0, 0, 1),
            SearchScope::ServicesOnly => (0, 1, 0),
            _ => (1, 0, 0),
        };
        assert_eq!(counts, expected, "{:?}", scope);
        assert_eq!(transport.request_count(), 1, "{:?} should not weave", scope);
    }
}

#[tokio::test]
async fn test_entities_interleave_across_directories() {
    let transport = Arc::new(
        MockTransport::new()
            .respond_for(
                "dirA",
                PROVIDER_PHASE,
                batch(&[
                    provider("dirA", "1", "Smith", &[], &[]),
                    provider("dirA", "2", "Smithers", &[], &[]),
                    provider("dirA", "3", "Smithson", &[], &[]),
                ]),
            )
            .respond_for("dirB", PROVIDER_PHASE, batch(&[provider("dirB", "1", "Smith", &[], &[])])),
    );
    let engine = OrchestrationEngine::new(config(&["dirA", "dirB"]), transport);

    let outcome = engine.search(&smith_search(), &ids(&["dirA", "dirB"])).await.unwrap();
    let order: Vec<String> = outcome.entities.iter().map(Entity::qualified_uid).collect();
    assert_eq!(order, vec!["dirA:1", "dirB:1", "dirA:2", "dirA:3"]);
}

#[tokio::test]
async fn test_slow_directory_times_out_over_http() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(batch(&[provider("dirA", "1", "Smith", &[], &[])])))
        .mount(&fast)
        .await;
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(transport::EMPTY_BATCH_RESPONSE)
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&slow)
        .await;

    let config = ClientConfig::default()
        .with_directory(DirectoryEndpoint::new("dirA", "A", BASE, fast.uri()))
        .with_directory(
            DirectoryEndpoint::new("dirB", "B", BASE, slow.uri()).with_request_timeout(Duration::from_millis(200)),
        );
    let engine = OrchestrationEngine::new_http(config).unwrap();

    let criteria = SearchCriteria {
        scope: SearchScope::IndividualProvidersOnly,
        uid: Some("1".to_string()),
        ..Default::default()
    };
    let outcome = engine.search(&criteria, &ids(&["dirA", "dirB"])).await.unwrap();

    assert_eq!(outcome.directory_results["dirA"].code, ResultCode::Success);
    assert_eq!(outcome.directory_results["dirB"].code, ResultCode::ResponseTimeout);
    assert_eq!(outcome.code, ResultCode::ResponseTimeout);
    assert_eq!(outcome.entities.len(), 1);
}

#[tokio::test]
async fn test_no_criteria_makes_no_calls() {
    let transport = Arc::new(MockTransport::new());
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

    let outcome = engine
        .search(&SearchCriteria::new(SearchScope::IndividualProvidersOnly), &ids(&["dirA"]))
        .await
        .unwrap();
    assert_eq!(outcome.code, ResultCode::NoSearchCriteria);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_no_directory_specified() {
    let transport = Arc::new(MockTransport::new());
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

    let outcome = engine.search(&smith_search(), &[]).await.unwrap();
    assert_eq!(outcome.code, ResultCode::NoDirectorySpecified);
    assert_eq!(outcome.code.as_i32(), -12);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_contract_violation_is_err() {
    let transport = Arc::new(MockTransport::new());
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

    let mut criteria = smith_search();
    criteria.service_profile = ServiceProfile::MllpHl7V2;
    assert_err!(engine.search(&criteria, &ids(&["dirA"])).await);

    // Free text mixed with a DN list
    let mixed = SearchCriteria {
        name_text: Some("Smith".into()),
        ..SearchCriteria::by_dns(
            SearchScope::IndividualProvidersOnly,
            DnSelector::IndividualProviders(vec![provider_dn("dirA", "1")]),
        )
    };
    assert!(matches!(
        engine.search(&mixed, &ids(&["dirA"])).await,
        Err(HpdError::Contract(_))
    ));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_unknown_and_inactive_directories() {
    let config = config(&["dirA"])
        .with_directory(DirectoryEndpoint::new("dirOff", "Off", BASE, "https://off.example/q").inactive());
    let transport = Arc::new(
        MockTransport::new().respond_for("dirA", PROVIDER_PHASE, batch(&[provider("dirA", "1", "Smith", &[], &[])])),
    );
    let engine = OrchestrationEngine::new(config, transport.clone());

    let outcome = engine
        .search(&smith_search(), &ids(&["dirA", "nowhere", "dirOff"]))
        .await
        .unwrap();

    assert_eq!(outcome.entities.len(), 1);
    assert_eq!(
        outcome.directory_results["nowhere"].code,
        ResultCode::DirectoryNotFoundInConfig
    );
    assert_eq!(
        outcome.directory_results["dirOff"].code,
        ResultCode::DirectoryNotFoundInConfig
    );
    assert!(outcome.directory_results["dirOff"].message.contains("inactive"));
    // entity and relationship phases for dirA only
    assert_eq!(transport.request_count(), 2);

    assert_eq!(engine.list_directories().len(), 1);
    assert!(engine.get_directory("DIRA").is_some());
}

#[tokio::test]
async fn test_affiliated_providers_short_circuit() {
    let transport = Arc::new(
        MockTransport::new()
            .respond_for(
                "dirA",
                AFFILIATION_PHASE,
                batch(&[
                    membership("dirA", "m1", &provider_dn("dirA", "7"), Some(org_dn("dirA", "500").as_str()), &[], "555-1111"),
                    membership("dirA", "m2", &provider_dn("dirA", "8"), Some(org_dn("dirA", "500").as_str()), &[], "555-2222"),
                ]),
            )
            .respond_for(
                "dirA",
                PROVIDER_PHASE,
                batch(&[
                    provider("dirA", "7", "Jones", &[], &[]),
                    provider("dirA", "8", "Brown", &[], &[]),
                ]),
            ),
    );
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

    let criteria = SearchCriteria {
        scope: SearchScope::ProvidersAffiliatedToOrg,
        uid: Some("500".to_string()),
        ..Default::default()
    };
    let outcome = engine.search(&criteria, &ids(&["dirA"])).await.unwrap();

    assert!(outcome.is_success(), "{}", outcome.message);
    let names: Vec<String> = outcome.entities.iter().map(Entity::name).collect();
    assert_eq!(names, vec!["Jones, Jane", "Brown, Jane"]);
    assert!(outcome.relationships.is_empty());

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].envelope.contains(&org_dn("dirA", "500")));
    assert!(requests[1].envelope.contains("dirA:7"));
    assert!(requests[1].envelope.contains("dirA:8"));
}

#[tokio::test]
async fn test_ping_directory() {
    let transport = Arc::new(
        MockTransport::new().respond_for("dirA", "Mercy Hospital", batch(&[org("dirA", "500", "Mercy Hospital")])),
    );
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport.clone());

    let outcome = engine.ping_directory("dirA").await.unwrap();
    assert!(outcome.is_success());

    let envelope = &transport.requests()[0].envelope;
    assert!(envelope.contains(ORG_PHASE));
    assert!(envelope.contains("<equalityMatch name='o'><value>Mercy Hospital</value></equalityMatch>"));

    let missing = engine.ping_directory("dirZ").await.unwrap();
    assert_eq!(missing.code, ResultCode::DirectoryNotFoundInConfig);
}

#[tokio::test]
async fn test_alternate_response_spelling() {
    let canonical = batch(&[provider("dirA", "1", "Smith", &[], &[])]);
    let alternate = canonical
        .replace("<attr ", "<dsml:attribute ")
        .replace("</attr>", "</dsml:attribute>")
        .replace("<searchResultEntry", "<dsml:searchResultEntry")
        .replace("</searchResultEntry", "</dsml:searchResultEntry");

    let run = |body: String| async move {
        let transport = Arc::new(MockTransport::new().respond(PROVIDER_PHASE, body));
        let engine = OrchestrationEngine::new(config(&["dirA"]), transport);
        engine.search(&smith_search(), &ids(&["dirA"])).await.unwrap()
    };

    let a = run(canonical).await;
    let b = run(alternate).await;
    assert_eq!(a.entities.len(), 1);
    assert_eq!(
        a.entities.iter().map(Entity::qualified_uid).collect::<Vec<_>>(),
        b.entities.iter().map(Entity::qualified_uid).collect::<Vec<_>>()
    );
    assert_eq!(a.entities[0].name(), b.entities[0].name());
}

#[tokio::test]
async fn test_directory_error_response() {
    let transport = Arc::new(MockTransport::new().respond(
        PROVIDER_PHASE,
        "<batchResponse><errorResponse type='malformedRequest'/></batchResponse>",
    ));
    let engine = OrchestrationEngine::new(config(&["dirA"]), transport);

    let outcome = engine.search(&smith_search(), &ids(&["dirA"])).await.unwrap();
    assert_eq!(outcome.code, ResultCode::MalformedOrInvalidRequest);
    assert!(outcome.entities.is_empty());
}
