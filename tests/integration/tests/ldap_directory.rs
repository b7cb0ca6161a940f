//! LDAP directory integration tests.

use dm_federation::{AuthOutcome, CredentialValidator, DirectorySource, RejectReason};
use dm_federation_ldap::{EncryptionType, LdapDirectoryProvider, LdapError};

use crate::common::{TestEnv, BASE_DN};

const PROFESSOR_DN: &str = "cn=Hubert J. Farnsworth,ou=people,dc=planetexpress,dc=com";

#[tokio::test]
#[ignore = "requires docker"]
async fn test_professor_authenticates_over_starttls() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider = env.provider();

    let outcome = provider.authenticate("professor", "professor").await?;
    assert_eq!(
        outcome,
        AuthOutcome::Authenticated {
            dn: PROFESSOR_DN.to_string()
        }
    );

    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_rejections_are_not_errors() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider = env.provider();

    let outcome = provider.validate_credential("junk", "junk").await?;
    assert_eq!(outcome, AuthOutcome::Rejected(RejectReason::UnknownIdentity));

    let outcome = provider.validate_credential("professor", "fry").await?;
    assert_eq!(outcome, AuthOutcome::Rejected(RejectReason::InvalidCredential));

    let outcome = provider.validate_credential("professor", "").await?;
    assert_eq!(outcome, AuthOutcome::Rejected(RejectReason::EmptyPassword));

    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_group_filter_returns_named_groups() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider = env.provider();

    let groups = provider.execute_group_filter().await?;
    let mut names: Vec<_> = groups.iter().map(|g| g.common_name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["admin_staff", "ship_crew"]);
    assert!(groups.iter().all(|g| g.remote_id.ends_with(BASE_DN)));

    let members = provider.group_member_entries().await?;
    let mut logins: Vec<_> = members.iter().map(|u| u.login.as_str()).collect();
    logins.sort_unstable();
    assert_eq!(logins, ["bender", "fry", "hermes", "leela", "professor"]);

    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_user_filter_maps_attributes() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let users = env.provider().user_entries().await?;
    let professor = users
        .iter()
        .find(|u| u.login == "professor")
        .expect("professor is seeded");

    assert_eq!(professor.remote_id, PROFESSOR_DN);
    assert_eq!(professor.first_name, "Hubert");
    assert_eq!(professor.last_name, "Farnsworth");
    assert_eq!(professor.email, "professor@planetexpress.com");

    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_plaintext_and_starttls_see_the_same_entries() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let plain = LdapDirectoryProvider::new(env.config_with(EncryptionType::None))?;
    let tls = env.provider();

    let mut plain_ids: Vec<_> = plain
        .execute_user_filter()
        .await?
        .into_iter()
        .map(|u| u.remote_id)
        .collect();
    let mut tls_ids: Vec<_> = tls
        .execute_user_filter()
        .await?
        .into_iter()
        .map(|u| u.remote_id)
        .collect();
    plain_ids.sort_unstable();
    tls_ids.sort_unstable();
    assert!(!plain_ids.is_empty());
    assert_eq!(plain_ids, tls_ids);

    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_wrong_service_password_is_a_bind_error() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let mut config = env.config();
    config.bind_password = "BadNewsEveryone".to_string();
    let provider = LdapDirectoryProvider::new(config)?;

    let err = provider.test_connection().await.unwrap_err();
    assert!(matches!(err, LdapError::Bind(_)), "{err}");

    Ok(())
}
