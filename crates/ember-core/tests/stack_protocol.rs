use ember_core::{
    Arguments, EmberConfig, EmberResult, ErrorKind, FromScript, Host, NativeFn, Pointer, TableRef,
    Value,
};

fn bare() -> Host {
    Host::with_config(EmberConfig::new().with_libs(false))
}

fn noop(_host: &mut Host, _args: Arguments) -> EmberResult<usize> {
    Ok(0)
}

#[test]
fn every_supported_type_round_trips() {
    let mut host = bare();
    let mut target = 7u64;
    let pointer = Pointer::new(&mut target as *mut u64);

    host.push(());
    host.pop::<()>().unwrap();

    host.push(true);
    assert!(host.pop::<bool>().unwrap());

    host.push(-42i32);
    assert_eq!(host.pop::<i32>().unwrap(), -42);

    host.push(i64::MIN);
    assert_eq!(host.pop::<i64>().unwrap(), i64::MIN);

    host.push(0.25f32);
    assert_eq!(host.pop::<f32>().unwrap(), 0.25);

    host.push(-1.5e300);
    assert_eq!(host.pop::<f64>().unwrap(), -1.5e300);

    host.push("text");
    assert_eq!(host.pop::<String>().unwrap(), "text");

    host.push(String::from("owned ünïcode"));
    assert_eq!(host.pop::<String>().unwrap(), "owned ünïcode");

    host.push(pointer);
    assert_eq!(host.pop::<Pointer>().unwrap(), pointer);

    host.push(Pointer::null());
    assert!(host.pop::<Pointer>().unwrap().is_null());

    host.push(noop as NativeFn);
    assert_eq!(host.pop::<NativeFn>().unwrap() as usize, noop as usize);

    assert_eq!(host.stack_depth(), 0);
}

fn accepts<T: FromScript>(host: &mut Host) -> bool {
    match host.pop::<T>() {
        Ok(_) => true,
        Err(err) => {
            assert_eq!(err.kind(), ErrorKind::TypeMismatch);
            assert_eq!(host.last_error(), Some(&err));
            false
        }
    }
}

type Check = fn(&mut Host) -> bool;

const CHECKS: &[(&str, Check)] = &[
    ("nil", accepts::<()>),
    ("boolean", accepts::<bool>),
    ("integer", accepts::<i64>),
    ("integer", accepts::<i32>),
    ("number", accepts::<f64>),
    ("number", accepts::<f32>),
    ("string", accepts::<String>),
    ("pointer", accepts::<Pointer>),
    ("table", accepts::<TableRef>),
    ("native function", accepts::<NativeFn>),
];

fn push_sample(host: &mut Host, kind: &str, table: &TableRef) {
    match kind {
        "nil" => host.push(()),
        "boolean" => host.push(false),
        "integer" => host.push(3i64),
        "number" => host.push(3.0f64),
        "string" => host.push("3"),
        "pointer" => host.push(Pointer::null()),
        "table" => host.push(table.clone()),
        "native function" => host.push(noop as NativeFn),
        other => panic!("unknown kind {other}"),
    }
}

#[test]
fn mismatched_pops_never_return_a_value() {
    let mut host = bare();
    host.add_module("sample").unwrap();
    let table = host.get::<TableRef>("sample").unwrap();

    for (pushed, _) in CHECKS {
        push_sample(&mut host, pushed, &table);
        for (expected, check) in CHECKS {
            if expected != pushed {
                assert!(!check(&mut host), "{expected} popped a {pushed}");
                assert_eq!(host.stack_depth(), 1, "mismatch consumed a {pushed}");
            }
        }
        let matching = CHECKS.iter().find(|(expected, _)| expected == pushed).unwrap();
        assert!((matching.1)(&mut host), "{pushed} did not pop as itself");
        assert_eq!(host.stack_depth(), 0);
    }
}

#[test]
fn out_of_range_integers_do_not_narrow() {
    let mut host = bare();
    host.push(i64::from(i32::MAX) + 1);
    assert!(host.pop::<i32>().is_err());
    assert_eq!(host.pop::<i64>().unwrap(), i64::from(i32::MAX) + 1);
}

#[test]
fn dynamic_values_and_options() {
    let mut host = bare();
    host.push(5i64);
    assert_eq!(host.pop::<Value>().unwrap(), Value::Integer(5));

    host.push(());
    assert_eq!(host.pop::<Option<bool>>().unwrap(), None);
    host.push(true);
    assert_eq!(host.pop::<Option<bool>>().unwrap(), Some(true));

    host.push(Some(2.5f64));
    host.push(None::<f64>);
    host.pop::<()>().unwrap();
    assert_eq!(host.pop::<f64>().unwrap(), 2.5);
}
