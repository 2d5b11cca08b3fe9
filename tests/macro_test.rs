#![allow(missing_docs)]
#![allow(dead_code)]

use graphcodec::graph::equivalent;
use graphcodec::{GraphCodec, GraphType, IntKind, ObjectGraph, Reflect, TypeCatalog, TypeKind};
use uuid::Uuid;

#[derive(GraphType)]
#[graph(name = "game.Player")]
struct Player {
    id: Uuid,
    name: String,
    level: u16,
    #[graph(declared = "game.Player")]
    rival: Option<Box<Player>>,
    #[graph(transient)]
    session_token: String,
    on_hit: fn(u32) -> u32,
    callback: Box<dyn Fn(&str) + Send>,
}

#[derive(GraphType)]
#[graph(name = "game.Inventory", collection)]
struct Inventory(Vec<u32>);

#[derive(GraphType)]
struct Position(f32, f32);

#[derive(GraphType)]
#[graph(name = "game.Guild")]
struct Guild {
    motto: Option<String>,
    banner: Box<Vec<u8>>,
    leader: Option<Box<Player>>,
    roster: Vec<u32>,
}

#[derive(GraphType, Clone, Copy)]
#[graph(name = "game.Class")]
#[repr(u8)]
enum Class {
    Warrior = 1,
    Mage = 2,
}

#[derive(GraphType)]
#[allow(conflicting_repr_hints)]
#[repr(C, i16)]
enum Mood {
    Calm,
    Angry,
}

#[test]
fn struct_fields_keep_order_and_spelling() {
    let shape = Player::shape();
    assert_eq!(shape.name, "game.Player");
    assert_eq!(shape.kind, TypeKind::Instance);

    let names: Vec<&str> = shape.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        ["id", "name", "level", "rival", "session_token", "on_hit", "callback"]
    );
    let declared: Vec<&str> = shape.fields.iter().map(|f| f.declared_type.as_str()).collect();
    assert_eq!(&declared[..4], ["Uuid", "String", "u16", "game.Player"]);
}

#[test]
fn transient_and_delegate_fields_are_skipped() {
    let shape = Player::shape();
    let written: Vec<&str> = shape.serializable_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(written, ["id", "name", "level", "rival"]);

    let by_name = |n: &str| shape.fields.iter().find(|f| f.name == n).unwrap();
    assert!(by_name("session_token").transient);
    assert!(by_name("on_hit").delegate);
    assert!(by_name("callback").delegate);
    assert!(!by_name("name").delegate);
}

#[test]
fn collections_and_tuple_structs() {
    let inventory = Inventory::shape();
    assert_eq!(inventory.kind, TypeKind::Collection);

    let position = Position::shape();
    assert_eq!(position.name, "macro_test.Position");
    let names: Vec<&str> = position.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["0", "1"]);
}

#[test]
fn option_and_box_wrappers_are_peeled_from_declared_types() {
    let shape = Guild::shape();
    let declared: Vec<&str> = shape.fields.iter().map(|f| f.declared_type.as_str()).collect();
    assert_eq!(declared, ["String", "Vec<u8>", "Player", "Vec<u32>"]);
}

#[test]
fn enums_follow_their_repr() {
    assert_eq!(Class::shape().kind, TypeKind::Enum(IntKind::U8));
    assert_eq!(Mood::shape().kind, TypeKind::Enum(IntKind::I16));
    assert_eq!(Mood::shape().name, "macro_test.Mood");
}

#[test]
fn derived_catalog_drives_the_codec() {
    let mut catalog = TypeCatalog::new();
    catalog.register::<Player>().register::<Class>();
    let codec = GraphCodec::new(catalog);

    let mut graph = ObjectGraph::new();
    let hero = graph.instantiate(codec.catalog(), "game.Player").unwrap();
    let villain = graph.instantiate(codec.catalog(), "game.Player").unwrap();
    graph.set_field(hero, "name", "Hero").unwrap();
    graph.set_field(hero, "level", 12u16).unwrap();
    graph.set_field(hero, "id", Uuid::new_v4()).unwrap();
    graph.set_field(hero, "rival", villain).unwrap();
    graph.set_field(villain, "rival", hero).unwrap();
    graph.set_field(hero, "session_token", "secret").unwrap();

    let decoded = codec.decode(&codec.encode(&graph, hero).unwrap()).unwrap();
    assert_eq!(
        decoded.graph.field(decoded.root, "session_token").unwrap(),
        Some(&graphcodec::Value::Null)
    );

    graph.set_field(hero, "session_token", graphcodec::Value::Null).unwrap();
    assert!(equivalent(&graph, hero, &decoded.graph, decoded.root));
}
