//! # arbor-store
//!
//! The two persisted documents of the arbor authorization server.
//!
//! ## Overview
//!
//! - [`org::OrgDocument`] — the organization document (`universe.xml`):
//!   people register plus the branch forest, held in memory as an arena
//!   ([`org::OrgTree`]).
//! - [`catalog::CatalogDocument`] — the catalog document
//!   (`catalogues.xml`): function records with tags.
//! - [`persist::DocumentFile`] — crash-safe whole-document persistence via
//!   temp-write / backup / rename.
//!
//! Both documents load fully at startup; a load failure is fatal to the
//! caller. Every mutation upstream ends in a synchronous full-document save.

pub mod catalog;
pub mod org;
pub mod persist;
pub mod xml;

pub use catalog::{CallDef, CatalogDocument, FuncProp, FunctionDef};
pub use org::{
    Branch, ChangeStamp, Funcset, OrgDocument, OrgTree, Person, Role, Slot, TreeError, WhiteList,
};
pub use persist::{DocumentFile, StoreError};
pub use xml::DocumentError;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Fixtures ──────────────────────────────────────────────────────────────

    const UNIVERSE: &str = r#"<universe>
  <registers>
    <people_register>
      <person id="u1" secret="pw1" pswChangedAt="1700000000" failures="0" readableName="User One" sessionMax="5" createdBy="root" createdAt="1700000000">
        <changed by="root" at="1700000100"/>
        <changed by="u1" at="1700000200"/>
      </person>
      <person id="u2" secret="pw2" pswChangedAt="1700000300" failures="2" expireAt="1800000000" readableName="" createdBy="root" createdAt="1700000300"/>
    </people_register>
  </registers>
  <branches>
    <branch id="b1">
      <func_white_list propagateParent="no"/>
      <employees>
        <employee pos="manager" person="u1"/>
        <employee pos="manager"/>
      </employees>
      <roles>
        <role name="manager">
          <funcset id="fs1"/>
        </role>
      </roles>
      <deffuncsets>
        <funcset id="fs1" name="Base set">
          <func id="fn1"/>
          <func id="fn2"/>
        </funcset>
      </deffuncsets>
      <branches>
        <branch id="b2">
          <func_white_list propagateParent="yes">
            <funcset id="fs1"/>
          </func_white_list>
          <employees/>
          <roles/>
          <deffuncsets>
            <funcset id="fs2"/>
          </deffuncsets>
          <branches/>
        </branch>
      </branches>
    </branch>
  </branches>
</universe>
"#;

    const CATALOGUES: &str = r#"<catalogues>
  <functions_catalogue>
    <function id="fn1" name="lookup" title="Lookup" descr="Finds things" tags="a,b">
      <call method="GET">
        <url>https://svc.example/api/lookup?x=1</url>
        <body content-type="application/json"/>
      </call>
    </function>
    <function id="fn2" title="Bare"/>
  </functions_catalogue>
</catalogues>
"#;

    fn universe() -> OrgDocument {
        xml::parse_org(UNIVERSE).expect("fixture must parse")
    }

    fn catalogues() -> CatalogDocument {
        xml::parse_catalog(CATALOGUES).expect("fixture must parse")
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn universe_parses_people_and_branches() {
        let doc = universe();

        assert_eq!(doc.people.len(), 2);
        let u1 = doc.person("u1").unwrap();
        assert_eq!(u1.secret, "pw1");
        assert_eq!(u1.session_max, Some(5));
        assert_eq!(u1.changes.len(), 2);
        assert_eq!(u1.changes[1].by, "u1");

        let u2 = doc.person("u2").unwrap();
        assert_eq!(u2.failures, 2);
        assert_eq!(u2.expire_at, Some(1_800_000_000));
        assert_eq!(u2.session_max, None);

        assert_eq!(doc.tree.roots(), &["b1".to_string()]);
        let b1 = doc.tree.branch("b1").unwrap();
        assert!(!b1.whitelist.propagate);
        assert_eq!(b1.employees.len(), 2);
        assert_eq!(b1.slot_counts("manager"), (2, 1));

        let b2 = doc.tree.branch("b2").unwrap();
        assert!(b2.whitelist.propagate);
        assert_eq!(b2.parent.as_deref(), Some("b1"));
        assert_eq!(b2.whitelist.funcsets, vec!["fs1".to_string()]);
    }

    #[test]
    fn funcset_index_built_on_load() {
        let doc = universe();
        assert_eq!(doc.tree.funcset_owner("fs1"), Some("b1"));
        assert_eq!(doc.tree.funcset_owner("fs2"), Some("b2"));
        assert_eq!(doc.tree.funcset_owner("fs9"), None);
        assert_eq!(
            doc.tree.funcset("fs1").unwrap().functions,
            vec!["fn1".to_string(), "fn2".to_string()]
        );
    }

    #[test]
    fn duplicate_branch_id_is_a_parse_error() {
        let bad = UNIVERSE.replace(r#"<branch id="b2">"#, r#"<branch id="b1">"#);
        assert!(xml::parse_org(&bad).is_err());
    }

    #[test]
    fn catalog_parses_call_details() {
        let cat = catalogues();
        assert_eq!(cat.functions.len(), 2);
        let fn1 = cat.function("fn1").unwrap();
        assert_eq!(fn1.tags.as_deref(), Some("a,b"));
        let call = fn1.call.as_ref().unwrap();
        assert_eq!(call.method.as_deref(), Some("GET"));
        assert_eq!(call.content_type.as_deref(), Some("application/json"));

        let fn2 = cat.function("fn2").unwrap();
        assert!(fn2.call.is_none());
    }

    // ── Round trips ───────────────────────────────────────────────────────────

    #[test]
    fn universe_round_trip_reproduces_the_model() {
        let doc = universe();
        let text = xml::write_org(&doc).unwrap();
        let again = xml::parse_org(&text).unwrap();
        assert_eq!(doc, again, "write∘parse must reproduce the document");
    }

    #[test]
    fn catalog_round_trip_reproduces_the_model() {
        let cat = catalogues();
        let text = xml::write_catalog(&cat).unwrap();
        let again = xml::parse_catalog(&text).unwrap();
        assert_eq!(cat, again);
    }

    // ── Arena behavior ────────────────────────────────────────────────────────

    #[test]
    fn attach_rejects_duplicate_ids() {
        let mut doc = universe();
        let err = doc.tree.attach(Some("b1"), Branch::empty("b2")).unwrap_err();
        assert!(matches!(err, TreeError::DuplicateBranch(ref id) if id == "b2"));
    }

    #[test]
    fn ancestor_or_self_walks_from_self_to_root() {
        let doc = universe();
        assert_eq!(
            doc.tree.ancestor_or_self("b2"),
            vec!["b2".to_string(), "b1".to_string()]
        );
        assert!(doc.tree.in_subtree("b1", "b2"));
        assert!(!doc.tree.in_subtree("b2", "b1"));
    }

    #[test]
    fn remove_subtree_unindexes_descendant_funcsets() {
        let mut doc = universe();
        doc.tree.remove_subtree("b2").unwrap();
        assert!(!doc.tree.contains("b2"));
        assert_eq!(doc.tree.funcset_owner("fs2"), None);
        assert_eq!(doc.tree.funcset_owner("fs1"), Some("b1"));
        assert!(doc.tree.branch("b1").unwrap().children.is_empty());
    }

    #[test]
    fn subtree_occupants_are_sorted_unique() {
        let mut doc = universe();
        doc.tree.branch_mut("b2").unwrap().employees.push(Slot {
            pos: "clerk".to_string(),
            person: Some("au".to_string()),
        });
        assert_eq!(doc.tree.subtree_occupants("b1"), vec!["au", "u1"]);
    }

    #[test]
    fn employment_lookup_finds_first_occupied_slot() {
        let doc = universe();
        assert_eq!(
            doc.tree.employment_of("u1"),
            Some(("b1".to_string(), "manager".to_string()))
        );
        assert_eq!(doc.tree.employment_of("nobody"), None);
    }

    // ── Function properties ───────────────────────────────────────────────────

    #[test]
    fn callpath_strips_the_query_string() {
        let cat = catalogues();
        let fn1 = cat.function("fn1").unwrap();
        assert_eq!(
            FuncProp::CallPath.extract(fn1).as_deref(),
            Some("https://svc.example/api/lookup")
        );
        assert_eq!(FuncProp::Method.extract(fn1).as_deref(), Some("GET"));

        let fn2 = cat.function("fn2").unwrap();
        assert_eq!(FuncProp::CallPath.extract(fn2), None);
        assert_eq!(FuncProp::Title.extract(fn2).as_deref(), Some("Bare"));
    }

    #[test]
    fn func_prop_parses_external_names_only() {
        assert_eq!(FuncProp::parse("callpath"), Some(FuncProp::CallPath));
        assert_eq!(FuncProp::parse("contenttype"), Some(FuncProp::ContentType));
        assert_eq!(FuncProp::parse("callPath"), None);
        assert_eq!(FuncProp::parse("bogus"), None);
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    #[test]
    fn save_leaves_previous_version_as_backup() {
        let dir = tempfile::tempdir().unwrap();
        let file = DocumentFile::new(dir.path().join("universe.xml"));

        file.save_text("first").unwrap();
        assert_eq!(file.load_text().unwrap(), "first");
        assert!(!file.backup_path().exists(), "no backup after initial save");

        file.save_text("second").unwrap();
        assert_eq!(file.load_text().unwrap(), "second");
        let backup = std::fs::read_to_string(file.backup_path()).unwrap();
        assert_eq!(backup.trim_start_matches('\u{feff}'), "first");
        assert!(!file.temp_path().exists(), "temp file must be renamed away");
    }

    #[test]
    fn load_strips_byte_order_marker() {
        let dir = tempfile::tempdir().unwrap();
        let file = DocumentFile::new(dir.path().join("universe.xml"));
        std::fs::write(file.path(), "\u{feff}<universe/>").unwrap();
        assert_eq!(file.load_text().unwrap(), "<universe/>");
    }

    #[test]
    fn documents_persist_through_document_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = DocumentFile::new(dir.path().join("universe.xml"));

        let doc = universe();
        doc.save(&file).unwrap();
        let loaded = OrgDocument::load(&file).unwrap();
        assert_eq!(doc, loaded);
    }
}
