//! Undo/redo tests: property write reversal, cascade round-trips,
//! save-points and redo-stack discipline.

use anyhow::Result;
use hyperstore_core::schema::{RelationKind, SchemaEntityBuilder, SchemaRelationshipBuilder};
use hyperstore_core::session::SessionConfig;
use hyperstore_core::store::Store;
use hyperstore_core::undo::UndoManager;
use serde_json::json;

fn library_store() -> Result<Store> {
    let mut store = Store::new();
    {
        let mut schemas = store.schemas_mut();
        schemas.add_entity(
            SchemaEntityBuilder::new("catalog", "Library")
                .property("Name", "string")
                .build(),
        )?;
        schemas.add_entity(
            SchemaEntityBuilder::new("catalog", "Book")
                .property("Title", "string")
                .build(),
        )?;
        schemas.add_relationship(
            SchemaRelationshipBuilder::new("catalog", "Holds", "catalog:Library", "catalog:Book")
                .kind(RelationKind::parse("1=>*")?)
                .build(),
        )?;
    }
    store.create_domain("d")?;
    Ok(store)
}

fn manager(store: &mut Store) -> UndoManager {
    let mut undo = UndoManager::new(store);
    undo.register_domain("d");
    undo
}

#[test]
fn test_undo_of_first_write_drops_the_property_node() -> Result<()> {
    let mut store = library_store()?;
    let mut undo = manager(&mut store);

    let book = store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)
    })?;
    store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .set_property_value(session, book.id(), "Title", json!("x"), None)?;
        Ok(())
    })?;

    undo.undo(&mut store, None)?;

    // the property node is gone, the accessor falls back to nothing
    let value = store.domain("d")?.get_property_value(book.id(), "Title")?;
    assert!(value.is_none());
    assert!(store.domain("d")?.element_exists(book.id()));

    undo.redo(&mut store, None)?;
    let value = store
        .domain("d")?
        .get_property_value(book.id(), "Title")?
        .unwrap();
    assert_eq!(value.value, json!("x"));
    Ok(())
}

#[test]
fn test_cascade_undo_redo_round_trip() -> Result<()> {
    let mut store = library_store()?;
    let mut undo = manager(&mut store);

    let (library, book) = store.run_in_session(SessionConfig::default(), |store, session| {
        let d = store.domain_mut("d")?;
        let library = d.create_entity(session, "catalog:Library", None, None)?;
        let book = d.create_entity(session, "catalog:Book", None, None)?;
        d.create_relationship(
            session,
            "catalog:Holds",
            library.id(),
            book.id(),
            None,
            None,
            None,
        )?;
        Ok((library.id().to_string(), book.id().to_string()))
    })?;

    store.run_in_session(SessionConfig::default(), |store, session| {
        store.domain_mut("d")?.remove(session, &library, None)?;
        Ok(())
    })?;
    assert!(store.domain("d")?.is_empty());

    // undo reinstates all three elements
    undo.undo(&mut store, None)?;
    let d = store.domain("d")?;
    assert!(d.element_exists(&library));
    assert!(d.element_exists(&book));
    assert_eq!(d.len(), 3);

    // redo removes them again
    undo.redo(&mut store, None)?;
    assert!(store.domain("d")?.is_empty());

    // and a further undo brings them back once more
    undo.undo(&mut store, None)?;
    assert_eq!(store.domain("d")?.len(), 3);
    Ok(())
}

#[test]
fn test_undo_then_redo_restores_property_values() -> Result<()> {
    let mut store = library_store()?;
    let mut undo = manager(&mut store);

    let book = store.run_in_session(SessionConfig::default(), |store, session| {
        let d = store.domain_mut("d")?;
        let book = d.create_entity(session, "catalog:Book", None, None)?;
        let id = book.id().to_string();
        d.set_property_value(session, &id, "Title", json!("first"), None)?;
        Ok(id)
    })?;
    store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .set_property_value(session, &book, "Title", json!("second"), None)?;
        Ok(())
    })?;

    undo.undo(&mut store, None)?;
    let value = store
        .domain("d")?
        .get_property_value(&book, "Title")?
        .unwrap();
    assert_eq!(value.value, json!("first"));

    undo.redo(&mut store, None)?;
    let value = store
        .domain("d")?
        .get_property_value(&book, "Title")?
        .unwrap();
    assert_eq!(value.value, json!("second"));
    Ok(())
}

#[test]
fn test_plain_commit_clears_the_redo_stack() -> Result<()> {
    let mut store = library_store()?;
    let mut undo = manager(&mut store);

    store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)?;
        Ok(())
    })?;
    undo.undo(&mut store, None)?;
    assert!(undo.can_redo());

    store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)?;
        Ok(())
    })?;
    assert!(!undo.can_redo());
    Ok(())
}

#[test]
fn test_save_point_pops_everything_above_it() -> Result<()> {
    let mut store = library_store()?;
    let mut undo = manager(&mut store);

    let e1 = store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)
    })?;
    let save_point = undo.save_point();
    assert!(save_point.is_some());

    let e2 = store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)
    })?;
    let e3 = store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)
    })?;

    undo.undo(&mut store, save_point)?;
    let d = store.domain("d")?;
    assert!(d.element_exists(e1.id()));
    assert!(!d.element_exists(e2.id()));
    assert!(!d.element_exists(e3.id()));

    // the whole span comes back as one redo frame
    undo.redo(&mut store, None)?;
    let d = store.domain("d")?;
    assert!(d.element_exists(e2.id()));
    assert!(d.element_exists(e3.id()));
    Ok(())
}

#[test]
fn test_unknown_save_point_drains_the_stack() -> Result<()> {
    let mut store = library_store()?;
    let mut undo = manager(&mut store);

    for _ in 0..3 {
        store.run_in_session(SessionConfig::default(), |store, session| {
            store
                .domain_mut("d")?
                .create_entity(session, "catalog:Book", None, None)?;
            Ok(())
        })?;
    }
    assert_eq!(undo.undo_depth(), 3);

    undo.undo(&mut store, Some(u64::MAX))?;
    assert_eq!(undo.undo_depth(), 0);
    assert!(store.domain("d")?.is_empty());
    Ok(())
}

#[test]
fn test_loading_sessions_are_not_recorded() -> Result<()> {
    use hyperstore_core::session::SessionMode;

    let mut store = library_store()?;
    let mut undo = manager(&mut store);

    store.run_in_session(
        SessionConfig::with_mode(SessionMode::LOADING),
        |store, session| {
            store
                .domain_mut("d")?
                .create_entity(session, "catalog:Book", None, None)?;
            Ok(())
        },
    )?;
    assert!(!undo.can_undo());
    Ok(())
}

#[test]
fn test_aborted_sessions_are_not_recorded() -> Result<()> {
    let mut store = library_store()?;
    let undo = manager(&mut store);

    let mut session = store.begin_session(SessionConfig::default());
    store
        .domain_mut("d")?
        .create_entity(&mut session, "catalog:Book", None, None)?;
    // closed without accepting
    store.close_session(session)?;

    assert!(!undo.can_undo());
    Ok(())
}

#[test]
fn test_event_filter_limits_recording() -> Result<()> {
    use hyperstore_core::events::EventKind;

    let mut store = library_store()?;
    let mut undo = UndoManager::new(&mut store);
    undo.register_domain_with_filter(
        "d",
        std::rc::Rc::new(|ev| !matches!(ev.kind, EventKind::ChangePropertyValue { .. })),
    );

    let book = store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)
    })?;
    store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .set_property_value(session, book.id(), "Title", json!("kept"), None)?;
        Ok(())
    })?;

    // the property write session was filtered down to nothing
    assert_eq!(undo.undo_depth(), 1);
    undo.undo(&mut store, None)?;
    assert!(!store.domain("d")?.element_exists(book.id()));
    Ok(())
}
