//! LDAP directory collaborator backed by `ldap3`.

use crate::{
    config::DirectoryConfig,
    dn::DistinguishedName,
    record::{RawEntry, Record},
    sync::{self, CommitOutcome, DirectoryModification, DirectoryReader, DirectoryWriter},
    sync::{WriteKind, WriteRequest},
    value::{AttributeMap, AttributeValue},
    Result,
};
use async_trait::async_trait;
use dirsync_core::error::Error;
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Requests every user attribute.
const ALL_USER_ATTRIBUTES: &[&str] = &["*"];

const MATCH_ALL_FILTER: &str = "(objectClass=*)";

/// LDAP `noSuchObject` result code.
const NO_SUCH_OBJECT: u32 = 32;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<RawEntry>>;
    async fn add(&mut self, dn: &str, operations: &[DirectoryModification]) -> Result<()>;
    async fn modify(&mut self, dn: &str, operations: &[DirectoryModification]) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Directory collaborator that reads and writes records over LDAP.
///
/// Every call opens its own connection, binds with the configured credentials and unbinds
/// before returning, so distinct records can be committed concurrently.
pub struct LdapDirectory {
    config: Arc<DirectoryConfig>,
    connector: Box<dyn LdapConnector>,
}

impl LdapDirectory {
    /// Creates a directory client that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self { config, connector }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_connector(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// Reads `dn` and returns it as a clean record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist.
    pub async fn fetch(&self, dn: &DistinguishedName) -> Result<Record> {
        sync::fetch(self, dn).await
    }

    /// Searches below `base` and hydrates every returned entry.
    ///
    /// Entries whose DN cannot be parsed are skipped.
    pub async fn search(
        &self,
        base: &DistinguishedName,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<Record>> {
        let mut session = self.session().await?;
        let entries = self
            .execute_with_timeout(session.search(
                base.as_str(),
                scope,
                filter,
                ALL_USER_ATTRIBUTES,
            ))
            .await;
        self.release(session).await;

        Ok(entries?
            .into_iter()
            .filter_map(|entry| {
                let dn = entry.dn.clone();
                match Record::from_raw(entry) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!("Skipping entry `{dn}`: {err}");
                        None
                    }
                }
            })
            .collect())
    }

    /// Commits the staged edits of `record` to this directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryWrite`] if the server rejects the write.
    pub async fn commit(&self, record: &mut Record) -> Result<CommitOutcome> {
        sync::commit(record, self).await
    }

    async fn session(&self) -> Result<Box<dyn LdapSession>> {
        let mut session = self.connector.connect().await?;
        let credentials = self.config.credentials();
        if credentials.is_anonymous() {
            return Ok(session);
        }
        self.execute_with_timeout(
            session.simple_bind(credentials.bind_dn(), credentials.bind_password()),
        )
        .await?;
        Ok(session)
    }

    async fn release(&self, mut session: Box<dyn LdapSession>) {
        if let Err(err) = self.execute_with_timeout(session.unbind()).await {
            warn!("LDAP unbind failed: {err}");
        }
    }

    async fn execute_with_timeout<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        timeout(self.config.operation_timeout(), fut)
            .await
            .map_err(|_| Error::Timeout("LDAP operation timed out".to_string()))?
    }
}

#[async_trait]
impl DirectoryReader for LdapDirectory {
    async fn read_raw(&self, dn: &DistinguishedName) -> Result<RawEntry> {
        let mut session = self.session().await?;
        let entries = self
            .execute_with_timeout(session.search(
                dn.as_str(),
                SearchScope::Base,
                MATCH_ALL_FILTER,
                ALL_USER_ATTRIBUTES,
            ))
            .await;
        self.release(session).await;

        entries?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("entry `{dn}` not found")))
    }
}

#[async_trait]
impl DirectoryWriter for LdapDirectory {
    async fn write_batch(&self, request: &WriteRequest) -> Result<()> {
        let mut session = self.session().await?;
        debug!(
            dn = %request.dn,
            kind = ?request.kind,
            operations = request.operations.len(),
            "sending LDAP write"
        );
        let outcome = match request.kind {
            WriteKind::Create => {
                self.execute_with_timeout(session.add(request.dn.as_str(), &request.operations))
                    .await
            }
            WriteKind::Modify => {
                self.execute_with_timeout(session.modify(request.dn.as_str(), &request.operations))
                    .await
            }
        };
        self.release(session).await;
        outcome
    }
}

/// Real LDAP connector backed by `ldap3`.
struct RealLdapConnector {
    config: Arc<DirectoryConfig>,
}

impl RealLdapConnector {
    fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession { inner: ldap }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .inner
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?;
        if result.rc != 0 {
            return Err(Error::ExternalServiceError {
                service: "ldap".to_string(),
                message: format!("bind failed (code {}): {}", result.rc, result.text),
            });
        }
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<RawEntry>> {
        let result = self
            .inner
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .await
            .map_err(map_ldap_error)?;
        if result.1.rc == NO_SUCH_OBJECT {
            return Ok(Vec::new());
        }
        let (entries, _) = result.success().map_err(map_ldap_error)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(raw_entry)
            .collect())
    }

    async fn add(&mut self, dn: &str, operations: &[DirectoryModification]) -> Result<()> {
        let attributes = operations
            .iter()
            .filter(|op| !op.is_delete())
            .map(|op| (op.attribute().as_bytes().to_vec(), value_set(op.values())))
            .collect::<Vec<_>>();

        let result = self
            .inner
            .add(dn, attributes)
            .await
            .map_err(map_ldap_error)?;
        ensure_write_success(&result)
    }

    async fn modify(&mut self, dn: &str, operations: &[DirectoryModification]) -> Result<()> {
        let mods = operations
            .iter()
            .map(|op| {
                let attribute = op.attribute().as_bytes().to_vec();
                let values = value_set(op.values());
                match op {
                    DirectoryModification::Add { .. } => Mod::Add(attribute, values),
                    DirectoryModification::Delete { .. } => Mod::Delete(attribute, values),
                }
            })
            .collect::<Vec<_>>();

        let result = self
            .inner
            .modify(dn, mods)
            .await
            .map_err(map_ldap_error)?;
        ensure_write_success(&result)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::ConfigError(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::ExternalServiceError {
        service: "ldap".to_string(),
        message: err.to_string(),
    }
}

fn ensure_write_success(result: &ldap3::LdapResult) -> Result<()> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(Error::directory_write(result.rc, result.text.clone()))
    }
}

fn value_set(values: &[AttributeValue]) -> HashSet<Vec<u8>> {
    values.iter().map(|value| value.as_bytes().to_vec()).collect()
}

/// Merges text and binary attributes; values keep server order.
fn raw_entry(entry: SearchEntry) -> RawEntry {
    let mut attributes = AttributeMap::new();
    for (name, values) in entry.attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.into_iter().map(AttributeValue::from));
    }
    for (name, values) in entry.bin_attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.into_iter().map(AttributeValue::from));
    }
    RawEntry {
        dn: entry.dn,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_core::BindCredentials;
    use std::collections::HashMap;

    fn sample_config() -> DirectoryConfig {
        DirectoryConfig::new(
            "ldaps://ldap.example.com",
            BindCredentials::new("cn=admin,dc=example,dc=com", "secret"),
        )
        .unwrap()
    }

    fn sample_entry() -> RawEntry {
        let mut attributes = AttributeMap::new();
        attributes.insert(
            "cn".to_string(),
            vec![AttributeValue::from("Bob"), AttributeValue::from("Robert")],
        );
        RawEntry {
            dn: "uid=bob,ou=people,dc=example,dc=com".to_string(),
            attributes,
        }
    }

    fn bound_session() -> MockLdapSession {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .withf(|dn, password| {
                dn.to_string() == "cn=admin,dc=example,dc=com" && password.to_string() == "secret"
            })
            .returning(|_, _| Ok(()));
        session.expect_unbind().times(1).returning(|| Ok(()));
        session
    }

    fn client_with(session: MockLdapSession) -> LdapDirectory {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move || Ok(Box::new(session)));
        LdapDirectory::with_connector(sample_config(), Box::new(connector))
    }

    fn bob_dn() -> DistinguishedName {
        DistinguishedName::parse("uid=bob,ou=people,dc=example,dc=com").unwrap()
    }

    #[tokio::test]
    async fn fetch_existing_record() {
        let mut session = bound_session();
        session
            .expect_search()
            .withf(|_, scope, filter, _| {
                *scope == SearchScope::Base && filter.to_string() == MATCH_ALL_FILTER
            })
            .returning(|_, _, _, _| Ok(vec![sample_entry()]));

        let client = client_with(session);
        let record = client.fetch(&bob_dn()).await.unwrap();
        assert_eq!(record.keys(), vec!["cn"]);
        assert_eq!(record.first_value("cn"), &AttributeValue::from("Bob"));
        assert!(!record.is_new());
    }

    #[tokio::test]
    async fn fetch_missing_record() {
        let mut session = bound_session();
        session
            .expect_search()
            .returning(|_, _, _, _| Ok(Vec::new()));

        let client = client_with(session);
        let result = client.fetch(&bob_dn()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn search_skips_malformed_entries() {
        let mut session = bound_session();
        session.expect_search().returning(|_, _, _, _| {
            Ok(vec![
                sample_entry(),
                RawEntry {
                    dn: "garbage".to_string(),
                    attributes: AttributeMap::new(),
                },
                RawEntry {
                    dn: "cn=foo\\ ,ou=people,dc=example,dc=com".to_string(),
                    attributes: AttributeMap::new(),
                },
            ])
        });

        let client = client_with(session);
        let base = DistinguishedName::parse("ou=people,dc=example,dc=com").unwrap();
        let records = client
            .search(&base, SearchScope::OneLevel, "(objectClass=person)")
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dn(), &bob_dn());
        assert_eq!(
            records[1].dn().as_str(),
            "cn=foo\\ ,ou=people,dc=example,dc=com"
        );
    }

    #[tokio::test]
    async fn anonymous_credentials_skip_bind() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().never();
        session
            .expect_search()
            .returning(|_, _, _, _| Ok(vec![sample_entry()]));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move || Ok(Box::new(session)));
        let config =
            DirectoryConfig::new("ldap://ldap.example.com", BindCredentials::new("", "")).unwrap();
        let client = LdapDirectory::with_connector(config, Box::new(connector));

        let record = client.fetch(&bob_dn()).await.unwrap();
        assert_eq!(record.first_value("cn"), &AttributeValue::from("Bob"));
    }

    #[tokio::test]
    async fn commit_new_record_uses_add() {
        let mut session = bound_session();
        session
            .expect_add()
            .withf(|dn, operations| {
                dn.to_string() == "uid=bob,ou=people,dc=example,dc=com" && operations.len() == 2
            })
            .times(1)
            .returning(|_, _| Ok(()));
        session.expect_modify().never();

        let client = client_with(session);
        let mut record = Record::new(bob_dn());
        record.add_value("cn", "Bob");
        record.add_value("objectClass", "person");

        let outcome = client.commit(&mut record).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Created);
        assert!(!record.is_new());
    }

    #[tokio::test]
    async fn rejected_modify_is_surfaced_and_session_released() {
        let mut session = bound_session();
        session
            .expect_modify()
            .times(1)
            .returning(|_, _| Err(Error::directory_write(16, "no such attribute")));

        let client = client_with(session);
        let mut record = Record::from_raw(sample_entry()).unwrap();
        record.remove_value("cn", &AttributeValue::from("Robert"));
        let before = record.clone();

        let err = client.commit(&mut record).await.unwrap_err();
        assert_eq!(err, Error::directory_write(16, "no such attribute"));
        assert_eq!(record, before);
    }

    #[tokio::test]
    async fn clean_record_does_not_connect() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let client = LdapDirectory::with_connector(sample_config(), Box::new(connector));

        let mut record = Record::from_raw(sample_entry()).unwrap();
        let outcome = client.commit(&mut record).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Unchanged);
    }

    #[test]
    fn raw_entry_merges_binary_attributes() {
        let mut attrs = HashMap::new();
        attrs.insert("cn".to_string(), vec!["Bob".to_string()]);
        let mut bin_attrs = HashMap::new();
        bin_attrs.insert("jpegPhoto".to_string(), vec![vec![0xff, 0xd8]]);

        let raw = raw_entry(SearchEntry {
            dn: "uid=bob".to_string(),
            attrs,
            bin_attrs,
        });
        assert_eq!(raw.dn, "uid=bob");
        assert_eq!(raw.attributes["cn"], vec![AttributeValue::from("Bob")]);
        assert_eq!(
            raw.attributes["jpegPhoto"],
            vec![AttributeValue::from(vec![0xff_u8, 0xd8])]
        );
    }

    #[test]
    fn write_result_codes() {
        let ok = ldap3::LdapResult {
            rc: 0,
            matched: String::new(),
            text: String::new(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        };
        assert!(ensure_write_success(&ok).is_ok());

        let rejected = ldap3::LdapResult {
            rc: 68,
            text: "entry already exists".to_string(),
            ..ok
        };
        assert_eq!(
            ensure_write_success(&rejected).unwrap_err(),
            Error::directory_write(68, "entry already exists")
        );
    }
}
