//! HPD federator HTTP server binary

use anyhow::Context;
use hpd_federator::{server, ClientConfig, DirectoryEndpoint, MockTransport, OrchestrationEngine};
use std::sync::Arc;

const DEFAULT_PORT: u16 = 8081;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    println!("HPD Federator");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let use_mock = std::env::args().any(|arg| arg == "--mock");

    let port = match std::env::var("HPD_SERVER_PORT") {
        Ok(raw) => raw
            .parse::<u16>()
            .with_context(|| format!("invalid HPD_SERVER_PORT '{}'", raw))?,
        Err(_) => DEFAULT_PORT,
    };

    let engine = if use_mock {
        println!("✓ Mode: MOCK directories");
        println!("   (omit --mock and set HPD_CONFIG to query real directories)");
        let (config, transport) = demo_directories();
        OrchestrationEngine::new(config, Arc::new(transport))
    } else {
        let path = std::env::var("HPD_CONFIG")
            .context("HPD_CONFIG must point to a JSON directory configuration (or pass --mock)")?;
        let raw = std::fs::read_to_string(&path).with_context(|| format!("cannot read {}", path))?;
        let config = ClientConfig::from_json(&raw).with_context(|| format!("invalid configuration in {}", path))?;
        println!("✓ Configuration: {}", path);
        OrchestrationEngine::new_http(config)?
    };

    for directory in engine.list_directories() {
        println!(
            "✓ Directory {} ({}) at {} [auth={}]",
            directory.id,
            directory.name,
            directory.service_url,
            directory.auth.label()
        );
    }
    println!("✓ Engine initialized with {} transport", engine.transport_name());
    println!("✓ Starting HTTP server on port {}...", port);
    println!();

    server::run_server(engine, port).await?;

    Ok(())
}

/// Two canned directories answering any provider or organization search
fn demo_directories() -> (ClientConfig, MockTransport) {
    let config = ClientConfig::default()
        .with_directory(DirectoryEndpoint::new(
            "demoA",
            "Demo Directory A",
            "o=HPD",
            "https://demo-a.hpd.example/query",
        ))
        .with_directory(DirectoryEndpoint::new(
            "demoB",
            "Demo Directory B",
            "o=HPD",
            "https://demo-b.hpd.example/query",
        ));

    let transport = MockTransport::new()
        .respond_for(
            "demoA",
            "dn='ou=HCProfessional,",
            demo_batch(&[
                demo_provider("demoA", "1001", "Smith", "Jane"),
                demo_provider("demoA", "1002", "Nguyen", "Minh"),
            ]),
        )
        .respond_for(
            "demoB",
            "dn='ou=HCProfessional,",
            demo_batch(&[demo_provider("demoB", "2001", "Garcia", "Luis")]),
        )
        .respond(
            "dn='ou=HCRegulatedOrganization,",
            demo_batch(&[
                "<searchResultEntry dn='uid=demoA:9001,ou=HCRegulatedOrganization,o=HPD'>\
                 <attr name='objectClass'><value>hcRegulatedOrganization</value></attr>\
                 <attr name='uid'><value>demoA:9001</value></attr>\
                 <attr name='o'><value>Mercy Hospital</value></attr>\
                 </searchResultEntry>"
                    .to_string(),
            ]),
        );

    (config, transport)
}

fn demo_provider(dir: &str, uid: &str, surname: &str, given: &str) -> String {
    format!(
        "<searchResultEntry dn='uid={dir}:{uid},ou=HCProfessional,o=HPD'>\
         <attr name='objectClass'><value>HPDProvider</value></attr>\
         <attr name='uid'><value>{dir}:{uid}</value></attr>\
         <attr name='sn'><value>{surname}</value></attr>\
         <attr name='givenName'><value>{given}</value></attr>\
         <attr name='hpdProviderPracticeAddress'><value>addr1=1 Main St$city=Springfield$state=IL$postalCode=62701</value></attr>\
         </searchResultEntry>"
    )
}

fn demo_batch(entries: &[String]) -> String {
    format!(
        "<batchResponse xmlns='urn:oasis:names:tc:DSML:2:0:core'>{}\
         <searchResultDone><resultCode code='0'/></searchResultDone></batchResponse>",
        entries.concat()
    )
}
