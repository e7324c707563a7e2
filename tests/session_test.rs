//! Session protocol tests: commit, nesting, abort, rollback atomicity and
//! constraint handling.

use anyhow::Result;
use hyperstore_core::events::EventKind;
use hyperstore_core::schema::{Constraint, SchemaEntityBuilder};
use hyperstore_core::session::SessionConfig;
use hyperstore_core::store::Store;
use serde_json::{json, Value};

fn book_store() -> Result<Store> {
    let mut store = Store::new();
    store.schemas_mut().add_entity(
        SchemaEntityBuilder::new("catalog", "Book")
            .property("Title", "string")
            .build(),
    )?;
    store.create_domain("d")?;
    Ok(store)
}

#[test]
fn test_commit_emits_one_add_entity_with_minted_id() -> Result<()> {
    let mut store = book_store()?;

    let mut session = store.begin_session(SessionConfig::default());
    let book = store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    assert_eq!(book.id(), "d:1");
    session.accept_changes();
    let info = store.close_session(session)?;

    assert!(!info.aborted);
    let adds: Vec<_> = info
        .events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::AddEntity))
        .collect();
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].id, "d:1");
    assert!(adds[0].top_level);
    assert_eq!(store.domain("d")?.sequence(), 1);
    Ok(())
}

#[test]
fn test_close_without_accept_rolls_back() -> Result<()> {
    let mut store = book_store()?;

    let mut session = store.begin_session(SessionConfig::default());
    let book = store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    let id = book.id().to_string();
    store
        .domain_mut("d")?
        .set_property_value(&mut session, &id, "Title", json!("doomed"), None)?;
    // no accept_changes
    let info = store.close_session(session)?;

    assert!(info.aborted);
    assert!(!store.domain("d")?.element_exists(&id));
    assert!(store.domain("d")?.is_empty());
    Ok(())
}

#[test]
fn test_nested_scope_without_accept_aborts_everything() -> Result<()> {
    let mut store = book_store()?;

    let mut session = store.begin_session(SessionConfig::default());
    store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    session.nest();
    store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    session.unnest()?;
    session.accept_changes();
    let info = store.close_session(session)?;

    assert!(info.aborted);
    assert!(store.domain("d")?.is_empty());
    Ok(())
}

#[test]
fn test_nested_scopes_commit_together() -> Result<()> {
    let mut store = book_store()?;

    let mut session = store.begin_session(SessionConfig::default());
    store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    session.nest();
    store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    session.accept_changes();
    session.unnest()?;
    session.accept_changes();
    let info = store.close_session(session)?;

    assert!(!info.aborted);
    assert_eq!(store.domain("d")?.len(), 2);
    // both scopes shared the same event list
    assert_eq!(info.events.len(), 2);
    Ok(())
}

#[test]
fn test_run_in_session_rolls_back_on_error() -> Result<()> {
    let mut store = book_store()?;

    let result: Result<(), _> = store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)?;
        // unknown schema fails the closure after a successful mutation
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Nope", None, None)?;
        Ok(())
    });

    assert!(result.is_err());
    assert!(store.domain("d")?.is_empty());
    Ok(())
}

#[test]
fn test_failing_check_constraint_aborts_commit() -> Result<()> {
    let mut store = Store::new();
    store.schemas_mut().add_entity(
        SchemaEntityBuilder::new("catalog", "Book")
            .property("Title", "string")
            .constraint(Constraint::check("a book needs a title", |ctx| {
                ctx.domain
                    .peek_property(ctx.element_id, "Title")
                    .and_then(|v| v.as_str().map(|s| !s.is_empty()))
                    .unwrap_or(false)
            }))
            .build(),
    )?;
    store.create_domain("d")?;

    let mut session = store.begin_session(SessionConfig::default());
    let book = store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    let id = book.id().to_string();
    session.accept_changes();
    let err = store.close_session(session).unwrap_err();

    assert!(err.to_string().contains("a book needs a title"));
    // rollback atomicity: the graph equals the pre-session state
    assert!(!store.domain("d")?.element_exists(&id));
    Ok(())
}

#[test]
fn test_passing_check_constraint_commits() -> Result<()> {
    let mut store = Store::new();
    store.schemas_mut().add_entity(
        SchemaEntityBuilder::new("catalog", "Book")
            .property("Title", "string")
            .constraint(Constraint::check("a book needs a title", |ctx| {
                ctx.domain.peek_property(ctx.element_id, "Title").is_some()
            }))
            .build(),
    )?;
    store.create_domain("d")?;

    let info = store.run_in_session(SessionConfig::default(), |store, session| {
        let book = store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)?;
        let id = book.id().to_string();
        store
            .domain_mut("d")?
            .set_property_value(session, &id, "Title", json!("ok"), None)?;
        Ok(id)
    })?;

    assert!(store.domain("d")?.element_exists(&info));
    Ok(())
}

#[test]
fn test_validate_constraint_reports_without_aborting() -> Result<()> {
    let mut store = Store::new();
    store.schemas_mut().add_entity(
        SchemaEntityBuilder::new("catalog", "Book")
            .property("Title", "string")
            .constraint(Constraint::validate("title is recommended", |ctx| {
                ctx.domain.peek_property(ctx.element_id, "Title").is_some()
            }))
            .build(),
    )?;
    store.create_domain("d")?;

    let mut session = store.begin_session(SessionConfig::default());
    let book = store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    let id = book.id().to_string();
    session.accept_changes();
    let info = store.close_session(session)?;

    assert!(!info.aborted);
    assert_eq!(info.diagnostics.len(), 1);
    assert!(info.diagnostics[0].message.contains("recommended"));
    assert!(store.domain("d")?.element_exists(&id));
    Ok(())
}

#[test]
fn test_property_scoped_check_runs_on_set() -> Result<()> {
    let mut store = Store::new();
    store.schemas_mut().add_entity(
        SchemaEntityBuilder::new("catalog", "Book")
            .property("Pages", "number")
            .constraint(
                Constraint::check("pages must be positive", |ctx| {
                    ctx.value
                        .and_then(Value::as_i64)
                        .map(|n| n > 0)
                        .unwrap_or(false)
                })
                .for_property("Pages"),
            )
            .build(),
    )?;
    store.create_domain("d")?;

    let mut session = store.begin_session(SessionConfig::default());
    let book = store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    let id = book.id().to_string();
    let err = store
        .domain_mut("d")?
        .set_property_value(&mut session, &id, "Pages", json!(-3), None)
        .unwrap_err();
    assert!(err.to_string().contains("positive"));
    assert!(session.is_aborted());
    let info = store.close_session(session)?;
    assert!(info.aborted);
    assert!(store.domain("d")?.is_empty());
    Ok(())
}

#[test]
fn test_property_scoped_check_passes_at_commit() -> Result<()> {
    let mut store = Store::new();
    store.schemas_mut().add_entity(
        SchemaEntityBuilder::new("catalog", "Book")
            .property("Pages", "number")
            .constraint(
                Constraint::check("pages must be positive", |ctx| {
                    ctx.value
                        .and_then(Value::as_i64)
                        .map(|n| n > 0)
                        .unwrap_or(false)
                })
                .for_property("Pages"),
            )
            .build(),
    )?;
    store.create_domain("d")?;

    // a valid write must survive the commit-time re-check as well
    let mut session = store.begin_session(SessionConfig::default());
    let book = store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    let id = book.id().to_string();
    store
        .domain_mut("d")?
        .set_property_value(&mut session, &id, "Pages", json!(5), None)?;
    session.accept_changes();
    let info = store.close_session(session)?;

    assert!(!info.aborted);
    assert!(store.domain("d")?.element_exists(&id));
    assert_eq!(
        store.domain("d")?.get_property_value(&id, "Pages")?.unwrap().value,
        json!(5)
    );
    Ok(())
}

#[test]
fn test_session_ids_are_monotonic() -> Result<()> {
    let mut store = book_store()?;
    let s1 = store.begin_session(SessionConfig::default());
    let first = s1.id();
    store.close_session(s1)?;
    let s2 = store.begin_session(SessionConfig::default());
    assert!(s2.id() > first);
    store.close_session(s2)?;
    Ok(())
}
