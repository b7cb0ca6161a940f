//! In-memory directory used by the unit tests.
//!
//! Seeded with the planetexpress people of the `rroemhild/test-openldap`
//! image, plus a few entries for edge cases: two users sharing a login, a
//! locked account, a user without an email and a group with a member that
//! no longer exists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dm_federation::{DirectoryEntry, FederationResult, IdentitySink, UpsertAction};
use parking_lot::Mutex;

use crate::config::{EncryptionType, LdapConfig, SearchScope};
use crate::connection::LdapConnection;
use crate::error::{LdapError, LdapResult};
use crate::search::LdapEntry;
use crate::session::{
    BindStatus, Dialer, DirectorySession, RC_INVALID_CREDENTIALS, RC_UNWILLING_TO_PERFORM,
};

pub const PEOPLE: &str = "ou=people,dc=planetexpress,dc=com";
pub const ADMIN_DN: &str = "cn=admin,dc=planetexpress,dc=com";
pub const ADMIN_PASSWORD: &str = "GoodNewsEveryone";
pub const PROFESSOR_DN: &str = "cn=Hubert J. Farnsworth,ou=people,dc=planetexpress,dc=com";
pub const CREW_GROUP_FILTER: &str = "(&(objectClass=group)(|(cn=ship_crew)(cn=admin_staff)))";

/// Entries matched by the default user filter.
pub const USER_COUNT: usize = 9;

const PERSON_CLASSES: [&str; 4] = ["top", "person", "organizationalPerson", "inetOrgPerson"];

pub fn config() -> LdapConfig {
    LdapConfig::builder()
        .server_host("localhost")
        .encryption_type(EncryptionType::StartTls)
        .base_dn(PEOPLE)
        .bind_dn(ADMIN_DN)
        .bind_password(ADMIN_PASSWORD)
        .build()
        .unwrap()
}

pub fn config_with_group_filter(filter: &str) -> LdapConfig {
    let mut config = config();
    config.group_filter = filter.to_string();
    config
}

/// Opens a service-bound connection to the fake directory.
pub async fn connect(
    directory: &Arc<FakeDirectory>,
    config: &LdapConfig,
) -> LdapConnection<FakeSession> {
    LdapConnection::establish(&FakeDialer::new(directory), config)
        .await
        .unwrap()
}

/// Opens an unbound session to the fake directory.
pub async fn dial(directory: &Arc<FakeDirectory>, config: &LdapConfig) -> FakeSession {
    FakeDialer::new(directory).dial(config).await.unwrap()
}

// ============================================================================
// Directory
// ============================================================================

#[derive(Default)]
pub struct FakeDirectory {
    entries: Vec<LdapEntry>,
    passwords: Mutex<HashMap<String, String>>,
    bind_codes: HashMap<String, u32>,
    binds: Mutex<Vec<String>>,
    unreachable: AtomicBool,
    reject_starttls: AtomicBool,
    dials: AtomicUsize,
    open_sessions: AtomicUsize,
    searches: AtomicUsize,
}

impl FakeDirectory {
    pub fn planetexpress() -> Arc<Self> {
        let mut directory = Self::default();
        directory
            .passwords
            .get_mut()
            .insert(ADMIN_DN.to_lowercase(), ADMIN_PASSWORD.to_string());

        directory.entries.push(
            LdapEntry::new(PEOPLE)
                .with_attr("objectClass", "organizationalUnit")
                .with_attr("ou", "people"),
        );

        let professor = directory.add_person("Hubert J. Farnsworth", "professor", true);
        let fry = directory.add_person("Philip J. Fry", "fry", true);
        let leela = directory.add_person("Turanga Leela", "leela", true);
        let bender = directory.add_person("Bender Bending Rodríguez", "bender", true);
        let hermes = directory.add_person("Hermes Conrad", "hermes", true);
        directory.add_person("John A. Zoidberg", "zoidberg", false);
        directory.add_person("Amy Wong", "amy", true);
        directory.add_person("Amy Kroker", "amy", true);
        let scruffy = directory.add_person("Scruffy Scruffington", "scruffy", true);
        directory
            .bind_codes
            .insert(scruffy.to_lowercase(), RC_UNWILLING_TO_PERFORM);

        directory.add_group("admin_staff", &[&professor, &hermes]);
        directory.add_group("ship_crew", &[&fry, &leela, &bender]);
        directory.add_group("robots", &[&bender, &format!("cn=Roberto,{PEOPLE}")]);

        Arc::new(directory)
    }

    /// Adds a person whose given name and surname are the first and last
    /// words of `cn`.
    fn add_person(&mut self, cn: &str, uid: &str, with_mail: bool) -> String {
        let given_name = cn.split(' ').next().unwrap_or(cn);
        let sn = cn.rsplit(' ').next().unwrap_or(cn);
        let dn = format!("cn={cn},{PEOPLE}");
        let mut entry = LdapEntry::new(&dn);
        for class in PERSON_CLASSES {
            entry = entry.with_attr("objectClass", class);
        }
        entry = entry
            .with_attr("cn", cn)
            .with_attr("uid", uid)
            .with_attr("givenName", given_name)
            .with_attr("sn", sn);
        if with_mail {
            entry = entry.with_attr("mail", format!("{uid}@planetexpress.com"));
        }
        self.entries.push(entry);
        self.passwords.get_mut().insert(dn.to_lowercase(), uid.to_string());
        dn
    }

    fn add_group(&mut self, cn: &str, members: &[&String]) {
        let mut entry = LdapEntry::new(format!("cn={cn},{PEOPLE}"))
            .with_attr("objectClass", "Group")
            .with_attr("objectClass", "top")
            .with_attr("cn", cn);
        for member in members {
            entry = entry.with_attr("member", member.as_str());
        }
        self.entries.push(entry);
    }

    pub fn set_password(&self, dn: &str, password: &str) {
        self.passwords.lock().insert(dn.to_lowercase(), password.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_reject_starttls(&self, reject: bool) {
        self.reject_starttls.store(reject, Ordering::SeqCst);
    }

    /// DNs of every bind attempt, in order.
    pub fn binds(&self) -> Vec<String> {
        self.binds.lock().clone()
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    fn find(&self, dn: &str) -> Option<&LdapEntry> {
        self.entries.iter().find(|e| e.dn.eq_ignore_ascii_case(dn))
    }
}

// ============================================================================
// Dialer and session
// ============================================================================

pub struct FakeDialer {
    directory: Arc<FakeDirectory>,
}

impl FakeDialer {
    pub fn new(directory: &Arc<FakeDirectory>) -> Self {
        Self {
            directory: Arc::clone(directory),
        }
    }
}

impl Dialer for FakeDialer {
    type Session = FakeSession;

    async fn dial(&self, config: &LdapConfig) -> LdapResult<FakeSession> {
        let directory = &self.directory;
        directory.dials.fetch_add(1, Ordering::SeqCst);

        if directory.unreachable.load(Ordering::SeqCst) {
            return Err(LdapError::connection("connection refused"));
        }
        if config.encryption_type == EncryptionType::StartTls
            && directory.reject_starttls.load(Ordering::SeqCst)
        {
            return Err(LdapError::StartTlsRejected(
                "unsupported extended operation".to_string(),
            ));
        }

        directory.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            directory: Arc::clone(directory),
            bound: false,
            released: false,
        })
    }
}

pub struct FakeSession {
    directory: Arc<FakeDirectory>,
    bound: bool,
    released: bool,
}

impl FakeSession {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.directory.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl DirectorySession for FakeSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> LdapResult<BindStatus> {
        let directory = &self.directory;
        directory.binds.lock().push(dn.to_string());
        self.bound = false;

        let key = dn.to_lowercase();
        if let Some(&code) = directory.bind_codes.get(&key) {
            return Ok(BindStatus::Rejected {
                code,
                message: "account locked".to_string(),
            });
        }

        let accepted = directory
            .passwords
            .lock()
            .get(&key)
            .is_some_and(|expected| expected == password);
        if accepted {
            self.bound = true;
            Ok(BindStatus::Accepted)
        } else {
            Ok(BindStatus::Rejected {
                code: RC_INVALID_CREDENTIALS,
                message: "Invalid credentials".to_string(),
            })
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> LdapResult<Vec<LdapEntry>> {
        let directory = &self.directory;
        directory.searches.fetch_add(1, Ordering::SeqCst);

        if !self.bound {
            return Err(LdapError::search("insufficient access"));
        }
        let filter = Filter::parse(filter)
            .ok_or_else(|| LdapError::search(format!("bad search filter: {filter}")))?;
        if directory.find(base_dn).is_none() {
            return Err(LdapError::NoSuchObject(base_dn.to_string()));
        }

        Ok(directory
            .entries
            .iter()
            .filter(|entry| in_scope(&entry.dn, base_dn, scope))
            .filter(|entry| filter.matches(entry))
            .map(|entry| project(entry, attributes))
            .collect())
    }

    async fn unbind(&mut self) -> LdapResult<()> {
        self.release();
        Ok(())
    }

    fn abandon(&mut self) {
        self.release();
    }
}

fn in_scope(dn: &str, base_dn: &str, scope: SearchScope) -> bool {
    let dn = dn.to_lowercase();
    let base = base_dn.to_lowercase();
    let suffix = format!(",{base}");
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => dn
            .strip_suffix(&suffix)
            .is_some_and(|rdn| !rdn.contains(',')),
        SearchScope::Subtree => dn == base || dn.ends_with(&suffix),
    }
}

/// Keeps only the requested attributes.
fn project(entry: &LdapEntry, attributes: &[String]) -> LdapEntry {
    let mut projected = LdapEntry::new(&entry.dn);
    for (name, values) in &entry.attributes {
        if attributes.iter().any(|a| a == "*" || a.eq_ignore_ascii_case(name)) {
            projected.attributes.insert(name.clone(), values.clone());
        }
    }
    projected
}

// ============================================================================
// Filter evaluation
// ============================================================================

/// The subset of RFC 4515 filters the tests use.
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
}

impl Filter {
    fn parse(filter: &str) -> Option<Self> {
        let (parsed, rest) = Self::parse_one(filter)?;
        rest.is_empty().then_some(parsed)
    }

    fn parse_one(input: &str) -> Option<(Self, &str)> {
        let input = input.strip_prefix('(')?;
        let op = input.chars().next()?;
        match op {
            '&' | '|' => {
                let mut rest = &input[1..];
                let mut items = Vec::new();
                while rest.starts_with('(') {
                    let (item, next) = Self::parse_one(rest)?;
                    items.push(item);
                    rest = next;
                }
                let rest = rest.strip_prefix(')')?;
                let filter = if op == '&' { Self::And(items) } else { Self::Or(items) };
                Some((filter, rest))
            }
            '!' => {
                let (inner, rest) = Self::parse_one(&input[1..])?;
                Some((Self::Not(Box::new(inner)), rest.strip_prefix(')')?))
            }
            _ => {
                let end = input.find(')')?;
                let (attr, value) = input[..end].split_once('=')?;
                if attr.is_empty() || attr.contains('(') || value.contains('(') {
                    return None;
                }
                let filter = if value == "*" {
                    Self::Present(attr.to_string())
                } else {
                    Self::Equal(attr.to_string(), unescape(value)?)
                };
                Some((filter, &input[end + 1..]))
            }
        }
    }

    fn matches(&self, entry: &LdapEntry) -> bool {
        match self {
            Self::And(items) => items.iter().all(|f| f.matches(entry)),
            Self::Or(items) => items.iter().any(|f| f.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
            Self::Present(attr) => attr.eq_ignore_ascii_case("objectClass") || entry.has_attr(attr),
            Self::Equal(attr, value) => entry
                .get_attrs(attr)
                .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
        }
    }
}

/// Decodes `\XX` escapes.
fn unescape(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut rest = value.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        if b == b'\\' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(b);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

// ============================================================================
// Identity sink
// ============================================================================

#[derive(Default)]
pub struct MemorySink {
    records: Mutex<HashMap<String, DirectoryEntry>>,
}

impl MemorySink {
    pub fn contains(&self, dn: &str) -> bool {
        self.records.lock().contains_key(&dn.to_lowercase())
    }

    fn upsert(&self, entry: &DirectoryEntry) -> UpsertAction {
        let mut records = self.records.lock();
        match records.insert(entry.identity_key(), entry.clone()) {
            None => UpsertAction::Added,
            Some(previous) if previous == *entry => UpsertAction::Unchanged,
            Some(_) => UpsertAction::Updated,
        }
    }
}

impl IdentitySink for MemorySink {
    async fn upsert_user(&self, entry: &DirectoryEntry) -> FederationResult<UpsertAction> {
        Ok(self.upsert(entry))
    }

    async fn upsert_group(&self, entry: &DirectoryEntry) -> FederationResult<UpsertAction> {
        Ok(self.upsert(entry))
    }
}

#[test]
fn filter_evaluation() {
    let directory = FakeDirectory::planetexpress();
    let fry = directory.find(&format!("cn=Philip J. Fry,{PEOPLE}")).unwrap();

    assert!(Filter::parse("(uid=fry)").unwrap().matches(fry));
    assert!(Filter::parse("(objectClass=INETORGPERSON)").unwrap().matches(fry));
    assert!(Filter::parse("(&(uid=fry)(!(uid=leela)))").unwrap().matches(fry));
    assert!(!Filter::parse("(uid=\\2a)").unwrap().matches(fry));
    assert!(Filter::parse("(&(uid=fry)").is_none());
    assert!(Filter::parse("(uid=fry))").is_none());
}
