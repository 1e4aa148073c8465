use ember_core::{EmberConfig, ErrorKind, Host, TableRef, Value};

fn bare() -> Host {
    Host::with_config(EmberConfig::new().with_libs(false))
}

#[test]
fn set_creates_intermediate_tables() {
    let mut host = bare();
    host.set("game.world.gravity", 9.81).unwrap();
    assert_eq!(host.get::<f64>("game.world.gravity").unwrap(), 9.81);
    assert!(host.get::<TableRef>("game").is_ok());
    assert!(host.get::<TableRef>("game.world").is_ok());
}

#[test]
fn resolution_is_idempotent() {
    let mut host = bare();
    host.set("a.b.c", 1i64).unwrap();
    let first = host.get::<TableRef>("a.b").unwrap();

    host.set("a.b.c", 2i64).unwrap();
    host.set("a.b.d", 3i64).unwrap();
    let second = host.get::<TableRef>("a.b").unwrap();

    assert_eq!(first, second);
    assert_eq!(host.get::<i64>("a.b.c").unwrap(), 2);
    assert_eq!(host.get::<i64>("a.b.d").unwrap(), 3);
    let keys: Vec<String> = {
        let table = first.borrow();
        let mut keys = Vec::new();
        let mut cursor = None;
        while let Some((key, _)) = table.next(cursor.as_ref()).unwrap() {
            keys.push(key.to_value().to_string());
            cursor = Some(key);
        }
        keys
    };
    assert_eq!(keys, vec!["c", "d"]);
}

#[test]
fn non_table_intermediate_fails_without_side_effects() {
    let mut host = bare();
    host.set("a.b", 5i64).unwrap();

    let err = host.set("a.b.c", 1i64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameResolution);
    assert_eq!(host.last_error().map(|e| e.kind()), Some(ErrorKind::NameResolution));
    assert_eq!(host.get::<i64>("a.b").unwrap(), 5);

    let err = host.get::<i64>("a.b.c").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameResolution);
}

#[test]
fn get_does_not_create_missing_paths() {
    let mut host = bare();
    let err = host.get::<i64>("never.exposed.value").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameResolution);
    assert!(err.to_string().contains("'never' is not defined"));
    assert_eq!(host.get::<Value>("never").unwrap(), Value::Nil);
}

#[test]
fn names_without_dots_live_in_globals() {
    let mut host = bare();
    host.set("plain", "value").unwrap();
    assert_eq!(host.globals().get_str("plain").to_string(), "value");

    host.set("", 3i64).unwrap();
    assert_eq!(host.get::<i64>("").unwrap(), 3);
}

#[test]
fn values_set_by_the_host_are_visible_to_scripts() {
    let mut host = Host::new();
    host.set("config.speed", 4i64).unwrap();
    host.load("t", "config.double = config.speed * 2").unwrap();
    assert_eq!(host.get::<i64>("config.double").unwrap(), 8);
}
