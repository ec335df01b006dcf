//! Distinguished-name helpers and the organizational-unit markers used for routing

/// OU holding regulated organizations
pub const ORG_OU: &str = "HCRegulatedOrganization";
/// OU holding individual providers
pub const INDIVIDUAL_OU: &str = "HCProfessional";
/// OU holding credentials
pub const CREDENTIAL_OU: &str = "HPDCredential";
/// OU holding provider/organization memberships
pub const RELATIONSHIP_OU: &str = "HPDProviderMembership";
/// OU holding electronic services
pub const SERVICE_OU: &str = "HPDElectronicService";

/// Split a DN into its RDN components, trimmed
pub fn rdns(dn: &str) -> impl Iterator<Item = &str> {
    dn.split(',').map(str::trim).filter(|rdn| !rdn.is_empty())
}

/// Value of the first RDN, e.g. `uid=a:b,ou=x` → `a:b`
pub fn id_from_dn(dn: &str) -> Option<&str> {
    let first = rdns(dn).next()?;
    let (_, value) = first.split_once('=')?;
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// The qualified UID carried in a DN's first RDN
pub fn qualified_uid_from_dn(dn: &str) -> Option<&str> {
    id_from_dn(dn)
}

/// The entity part of the qualified UID in a DN's first RDN, e.g. `uid=a:b,...` → `b`
pub fn unqualified_uid_from_dn(dn: &str) -> Option<&str> {
    let qualified = qualified_uid_from_dn(dn)?;
    match qualified.split_once(':') {
        Some((_, rest)) => rest.split(':').next().filter(|s| !s.is_empty()),
        None => Some(qualified),
    }
}

/// Qualify a bare UID with the directory id; already qualified UIDs pass through
pub fn qualify_uid(directory_id: &str, uid: &str) -> String {
    if uid.contains(':') {
        uid.to_string()
    } else {
        format!("{}:{}", directory_id, uid)
    }
}

/// DN of an organization entry given its UID, under the directory base DN
pub fn organization_dn(directory_id: &str, uid: &str, base_dn: &str) -> String {
    format!("uid={},ou={},{}", qualify_uid(directory_id, uid), ORG_OU, base_dn)
}

/// True if any RDN of `dn` is `ou=<marker>`, ignoring case
pub fn has_ou(dn: &str, marker: &str) -> bool {
    rdns(dn).any(|rdn| match rdn.split_once('=') {
        Some((attr, value)) => {
            attr.trim().eq_ignore_ascii_case("ou") && value.trim().eq_ignore_ascii_case(marker)
        }
        None => false,
    })
}
