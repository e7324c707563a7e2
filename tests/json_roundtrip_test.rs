//! JSON loader tests: envelope load with sequence recovery, removal
//! records, envelope round-trip and POCO load/stringify with `$id`/`$ref`.

use anyhow::Result;
use hyperstore_core::schema::{RelationKind, SchemaEntityBuilder, SchemaRelationshipBuilder};
use hyperstore_core::session::SessionConfig;
use hyperstore_core::store::Store;
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
                .start_property("Books")
                .end_property("Library")
                .build(),
        )?;
    }
    store.create_domain("d")?;
    Ok(store)
}

#[test]
fn test_loaded_numeric_id_ratchets_the_sequence() -> Result<()> {
    let mut store = library_store()?;

    let loaded = store.load_json(
        "d",
        &json!({
            "entities": [
                {"id": 42, "schema": "catalog:Book",
                 "properties": [{"name": "Title", "value": "Loaded"}]}
            ],
            "relationships": []
        }),
    )?;
    assert_eq!(loaded, vec!["d:42".to_string()]);

    let fresh = store.run_in_session(SessionConfig::default(), |store, session| {
        store
            .domain_mut("d")?
            .create_entity(session, "catalog:Book", None, None)
    })?;
    assert_eq!(fresh.id(), "d:43");

    let title = store
        .domain("d")?
        .get_property_value("d:42", "Title")?
        .unwrap();
    assert_eq!(title.value, json!("Loaded"));
    Ok(())
}

#[test]
fn test_envelope_schema_index_resolution() -> Result<()> {
    let mut store = library_store()?;

    store.load_json(
        "d",
        &json!({
            "schemas": [{"name": "catalog", "elements": [
                {"id": 0, "name": "Library"},
                {"id": 1, "name": "Book"}
            ]}],
            "entities": [
                {"id": 1, "schema": 0},
                {"id": 2, "schema": 1}
            ],
            "relationships": [
                {"id": 3, "schema": "catalog:Holds", "startId": 1, "endId": 2,
                 "endSchemaId": 1}
            ]
        }),
    )?;

    let d = store.domain("d")?;
    assert_eq!(d.schema_of("d:1").as_deref(), Some("catalog:Library"));
    assert_eq!(d.schema_of("d:2").as_deref(), Some("catalog:Book"));
    assert!(d.element_exists("d:3"));
    Ok(())
}

#[test]
fn test_envelope_state_d_removes() -> Result<()> {
    let mut store = library_store()?;

    store.load_json(
        "d",
        &json!({
            "entities": [{"id": 7, "schema": "catalog:Book"}],
            "relationships": []
        }),
    )?;
    assert!(store.domain("d")?.element_exists("d:7"));

    store.load_json(
        "d",
        &json!({
            "entities": [{"id": 7, "schema": "catalog:Book", "state": "D"}],
            "relationships": []
        }),
    )?;
    assert!(!store.domain("d")?.element_exists("d:7"));
    Ok(())
}

#[test]
fn test_envelope_round_trip_into_fresh_domain() -> Result<()> {
    let mut store = library_store()?;

    store.run_in_session(SessionConfig::default(), |store, session| {
        let d = store.domain_mut("d")?;
        let library = d.create_entity(session, "catalog:Library", None, None)?;
        d.set_property_value(session, library.id(), "Name", json!("Central"), None)?;
        let book = d.create_entity(session, "catalog:Book", None, None)?;
        d.set_property_value(session, book.id(), "Title", json!("Graphs"), None)?;
        d.create_relationship(
            session,
            "catalog:Holds",
            library.id(),
            book.id(),
            None,
            None,
            None,
        )?;
        Ok(())
    })?;

    let saved = store.save_json("d")?;
    store.create_domain("e")?;
    store.load_json("e", &saved)?;

    let e = store.domain("e")?;
    assert_eq!(e.len(), 3);
    assert_eq!(
        e.get_property_value("e:1", "Name")?.unwrap().value,
        json!("Central")
    );
    assert_eq!(
        e.get_property_value("e:2", "Title")?.unwrap().value,
        json!("Graphs")
    );
    // the relationship carried over with its endpoints remapped
    assert_eq!(e.relationship_terminals("catalog:Holds", "e:1", false), vec!["e:2"]);
    Ok(())
}

#[test]
fn test_poco_load_builds_related_elements() -> Result<()> {
    let mut store = library_store()?;

    let root = store.load_json_as(
        "d",
        "catalog:Library",
        &json!({
            "Name": "Central",
            "Books": [
                {"Title": "tea"},
                {"Title": "toy"}
            ]
        }),
    )?;

    let d = store.domain("d")?;
    assert_eq!(d.get_property_value(&root, "Name")?.unwrap().value, json!("Central"));
    let books = d.reference_targets(&root, "Books");
    assert_eq!(books.len(), 2);
    let titles: Vec<_> = books
        .iter()
        .filter_map(|b| d.peek_property(b, "Title"))
        .collect();
    assert!(titles.contains(&json!("tea")));
    assert!(titles.contains(&json!("toy")));
    Ok(())
}

#[test]
fn test_poco_ref_resolves_back_reference() -> Result<()> {
    let mut store = library_store()?;

    let root = store.load_json_as(
        "d",
        "catalog:Library",
        &json!({
            "$id": "lib",
            "Name": "Central",
            "Books": [
                {"Title": "tea", "Library": {"$ref": "lib"}}
            ]
        }),
    )?;

    let d = store.domain("d")?;
    let books = d.reference_targets(&root, "Books");
    assert_eq!(books.len(), 1);
    // the back-reference resolved to the tagged element, no duplicate edge
    assert_eq!(d.reference_targets(&books[0], "Library"), vec![root.clone()]);
    assert_eq!(d.len(), 3);
    Ok(())
}

#[test]
fn test_poco_array_on_scalar_reference_is_a_type_mismatch() -> Result<()> {
    let mut store = library_store()?;

    let err = store
        .load_json_as(
            "d",
            "catalog:Book",
            &json!({
                "Title": "tea",
                "Library": [{"Name": "one"}, {"Name": "two"}]
            }),
        )
        .unwrap_err();
    assert!(err.to_string().contains("Type mismatch"));
    // the failed load rolled back entirely
    assert!(store.domain("d")?.is_empty());
    Ok(())
}

#[test]
fn test_stringify_round_trip() -> Result<()> {
    let mut store = library_store()?;

    let library = store.run_in_session(SessionConfig::default(), |store, session| {
        let d = store.domain_mut("d")?;
        let library = d.create_entity(session, "catalog:Library", None, None)?;
        d.set_property_value(session, library.id(), "Name", json!("Central"), None)?;
        let book = d.create_entity(session, "catalog:Book", None, None)?;
        d.set_property_value(session, book.id(), "Title", json!("tea"), None)?;
        d.create_relationship(
            session,
            "catalog:Holds",
            library.id(),
            book.id(),
            None,
            None,
            None,
        )?;
        Ok(library.id().to_string())
    })?;

    let value = store.stringify("d", &library)?;
    // the cycle through the opposite reference collapses into $id/$ref
    assert!(value.get("$id").is_some());
    assert_eq!(value["Name"], json!("Central"));
    assert_eq!(value["Books"][0]["Title"], json!("tea"));
    assert_eq!(value["Books"][0]["Library"]["$ref"], value["$id"]);

    store.create_domain("e")?;
    let root = store.load_json_as("e", "catalog:Library", &value)?;
    let e = store.domain("e")?;
    assert_eq!(e.get_property_value(&root, "Name")?.unwrap().value, json!("Central"));
    let books = e.reference_targets(&root, "Books");
    assert_eq!(books.len(), 1);
    assert_eq!(e.peek_property(&books[0], "Title"), Some(json!("tea")));
    // one library, one book, one relationship; the $ref did not duplicate
    assert_eq!(e.len(), 3);
    Ok(())
}

#[test]
fn test_loading_is_invisible_to_undo() -> Result<()> {
    use hyperstore_core::undo::UndoManager;

    let mut store = library_store()?;
    let mut undo = UndoManager::new(&mut store);
    undo.register_domain("d");

    store.load_json(
        "d",
        &json!({
            "entities": [{"id": 1, "schema": "catalog:Book"}],
            "relationships": []
        }),
    )?;

    assert!(!undo.can_undo());
    assert!(store.domain("d")?.element_exists("d:1"));
    Ok(())
}
