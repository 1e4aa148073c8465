use ember_core::{
    compile, Arguments, EmberConfig, EmberError, EmberResult, ErrorKind, Host, NativeFn, TableRef,
    Value,
};

/// Pops two integers and pushes their sum
fn add(host: &mut Host, _args: Arguments) -> EmberResult<usize> {
    let b = host.pop::<i64>()?;
    let a = host.pop::<i64>()?;
    host.push(a + b);
    Ok(1)
}

fn tag_a(host: &mut Host, _args: Arguments) -> EmberResult<usize> {
    host.push("a");
    Ok(1)
}

fn tag_b(host: &mut Host, _args: Arguments) -> EmberResult<usize> {
    host.push("b");
    Ok(1)
}

fn host_id(host: &mut Host, _args: Arguments) -> EmberResult<usize> {
    let id = host.id().to_string();
    host.push(id);
    Ok(1)
}

/// Calls the script function named by its first argument with the rest
fn apply(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let name = args.get::<String>(0)?;
    for value in args.iter().skip(1) {
        host.push(value.clone());
    }
    host.call(&name, args.len() - 1)
}

fn strict(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let n = args.get::<i64>(0)?;
    host.push(n);
    Ok(1)
}

#[test]
fn math_add_scenario() {
    let mut host = Host::new();
    host.expose("math.add", add).unwrap();
    host.push(2i64);
    host.push(3i64);
    let n = host.call("math.add", 2).unwrap();
    assert_eq!(n, 1);
    assert_eq!(host.pop::<i64>().unwrap(), 5);
    assert_eq!(host.stack_depth(), 0);
}

#[test]
fn scripts_reach_exposed_natives() {
    let mut host = Host::new();
    host.expose("math.add", add).unwrap();
    host.load("t", "total = math.add(40, 2)").unwrap();
    assert_eq!(host.get::<i64>("total").unwrap(), 42);
}

#[test]
fn exposition_dispatches_to_the_exact_function() {
    let mut host = Host::new();
    host.expose("ns.first", tag_a).unwrap();
    host.expose("ns.second", tag_b).unwrap();
    host.expose("ns.id", host_id).unwrap();

    assert_eq!(host.call("ns.first", 0).unwrap(), 1);
    assert_eq!(host.pop::<String>().unwrap(), "a");
    assert_eq!(host.call("ns.second", 0).unwrap(), 1);
    assert_eq!(host.pop::<String>().unwrap(), "b");

    let mut other = Host::new();
    other.expose("ns.id", host_id).unwrap();
    host.call("ns.id", 0).unwrap();
    assert_eq!(host.pop::<String>().unwrap(), host.id().to_string());
    other.call("ns.id", 0).unwrap();
    assert_eq!(other.pop::<String>().unwrap(), other.id().to_string());
}

#[test]
fn re_exposing_the_same_function_reuses_its_handle() {
    let mut host = Host::new();
    host.expose("x.f", tag_a).unwrap();
    host.expose("y.f", tag_a).unwrap();
    assert_eq!(host.get::<Value>("x.f").unwrap(), host.get::<Value>("y.f").unwrap());
    assert_eq!(host.get::<NativeFn>("x.f").unwrap() as usize, tag_a as usize);
}

#[test]
fn natives_from_another_host_are_rejected() {
    let mut owner = Host::new();
    owner.expose("f", tag_a).unwrap();
    let foreign = owner.get::<Value>("f").unwrap();

    let mut host = Host::new();
    host.set("f", foreign).unwrap();
    let err = host.call("f", 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Call);
    assert!(err.to_string().contains("called from host"));
}

#[test]
fn multiple_results_stay_on_the_stack() {
    let mut host = Host::new();
    host.load("t", "function three(x) return x, x * 2, x * 3 end").unwrap();
    host.push(5i64);
    assert_eq!(host.call("three", 1).unwrap(), 3);
    assert_eq!(host.pop::<i64>().unwrap(), 15);
    assert_eq!(host.pop::<i64>().unwrap(), 10);
    assert_eq!(host.pop::<i64>().unwrap(), 5);
}

#[test]
fn failed_call_restores_the_stack() {
    let mut host = Host::new();
    host.load("t", "function explode(a, b) local t = {a, b} error('boom') end").unwrap();
    host.push("sentinel");
    host.push(1i64);
    host.push(2i64);

    let err = host.call("explode", 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Call);
    assert_eq!(err.to_string(), "t:1: boom");
    assert_eq!(host.last_error(), Some(&err));
    assert_eq!(host.stack_depth(), 1);
    assert_eq!(host.pop::<String>().unwrap(), "sentinel");
}

#[test]
fn undefined_function_consumes_staged_arguments() {
    let mut host = Host::new();
    host.push(1i64);
    let err = host.call("missing.function", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameResolution);
    assert_eq!(host.stack_depth(), 0);

    host.push(1i64);
    let err = host.call("nothing_here", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameResolution);
    assert_eq!(host.stack_depth(), 0);
}

#[test]
fn calling_a_non_function_fails() {
    let mut host = Host::new();
    host.set("number", 4i64).unwrap();
    let err = host.call("number", 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Call);
    assert_eq!(err.to_string(), "attempt to call a number value");
}

#[test]
fn argument_errors_abort_the_script_call() {
    let mut host = Host::new();
    host.expose("strict", strict).unwrap();
    host.load("t", "function go() local r = strict('nope') reached = true return r end").unwrap();
    let err = host.call("go", 0).unwrap_err();
    assert_eq!(
        err,
        EmberError::Argument {
            index: 0,
            detail: "integer expected, got string".to_string()
        }
    );
    assert_eq!(host.get::<Value>("reached").unwrap(), Value::Nil);
    assert_eq!(host.stack_depth(), 0);
}

#[test]
fn natives_may_call_back_into_scripts() {
    let mut host = Host::new();
    host.expose("apply", apply).unwrap();
    host.load(
        "t",
        r#"
        function mul(a, b) return a * b end
        function outer(x) return apply("mul", x, 7) end
        "#,
    )
    .unwrap();
    host.push(6i64);
    assert_eq!(host.call("outer", 1).unwrap(), 1);
    assert_eq!(host.pop::<i64>().unwrap(), 42);
}

#[test]
fn bad_load_leaves_the_host_usable() {
    let mut host = Host::new();
    let err = host.load("bad", "this is not valid syntax").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(!err.to_string().is_empty());
    assert!(err.to_string().starts_with("bad:1:"));
    assert_eq!(host.last_error(), Some(&err));

    host.load("good", "ready = true").unwrap();
    assert!(host.get::<bool>("ready").unwrap());
    assert_eq!(host.last_error(), Some(&err));
    host.clear_error();
    assert_eq!(host.last_error(), None);
}

#[test]
fn runtime_faults_during_load_keep_earlier_side_effects() {
    let mut host = Host::new();
    let err = host.load("partial", "before = 1\nlocal x = nil + 1\nafter = 2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Call);
    assert!(err.to_string().starts_with("partial:2:"));
    assert_eq!(host.get::<i64>("before").unwrap(), 1);
    assert_eq!(host.get::<Value>("after").unwrap(), Value::Nil);
}

#[test]
fn runaway_recursion_is_contained() {
    let mut host = Host::with_config(EmberConfig::new().with_max_call_depth(64));
    host.load("t", "function down(n) return down(n + 1) end").unwrap();
    host.push(0i64);
    let err = host.call("down", 1).unwrap_err();
    assert!(err.to_string().contains("stack overflow"));
    assert_eq!(host.stack_depth(), 0);

    host.load("t", "function ok() return 1 end").unwrap();
    assert_eq!(host.call("ok", 0).unwrap(), 1);
}

#[test]
fn precompiled_bytecode_loads_through_the_same_entry_point() {
    let mut artifact = Vec::new();
    compile(
        "lib",
        "function greet(name) return 'hello ' .. name end",
        |chunk| {
            artifact.extend_from_slice(chunk);
            true
        },
        |text| panic!("unexpected diagnostic: {text}"),
    )
    .unwrap();

    let mut host = Host::new();
    host.load("lib", &artifact).unwrap();
    host.push("ember");
    host.call("greet", 1).unwrap();
    assert_eq!(host.pop::<String>().unwrap(), "hello ember");

    let err = host.load("truncated", &artifact[..artifact.len() / 2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[test]
fn memory_usage_tracks_live_objects() {
    let mut host = Host::new();
    let baseline = host.memory_usage();
    assert!(baseline > 0);

    host.load("t", "big = {} for i = 1, 1000 do big[i] = 'item' .. i end").unwrap();
    let grown = host.memory_usage();
    assert!(grown > baseline);

    host.load("t", "big = nil").unwrap();
    assert!(host.memory_usage() < grown);
}

#[test]
fn memory_limit_turns_growth_into_a_call_error() {
    let fresh = Host::new();
    let limit = fresh.memory_usage() + 4096;
    drop(fresh);

    let mut host = Host::with_config(EmberConfig::new().with_memory_limit(limit));
    let err = host
        .load("t", "t = {} for i = 1, 100000 do t[i] = i end")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Call);
    assert!(err.to_string().contains("not enough memory"));
}

#[test]
fn cyclic_garbage_is_collected() {
    let mut host = Host::new();
    let baseline = host.memory_usage();
    host.load("c", "keep = {} keep.me = keep for i = 1, 1000 do local t = {} t.self = t end")
        .unwrap();
    assert!(host.memory_usage() > baseline + 1000);

    assert!(host.collect_garbage() >= 1000);
    assert!(host.memory_usage() < baseline + 1000);
    let keep = host.get::<TableRef>("keep").unwrap();
    assert_eq!(host.get::<TableRef>("keep.me").unwrap(), keep);
}

#[test]
fn cyclic_garbage_does_not_exhaust_the_memory_limit() {
    let fresh = Host::new();
    let limit = fresh.memory_usage() + 64 * 1024;
    drop(fresh);

    let mut host = Host::with_config(EmberConfig::new().with_memory_limit(limit));
    host.load("c", "for i = 1, 100000 do local t = {} t.self = t end")
        .unwrap();
    assert!(host.memory_usage() <= limit);
}

#[test]
fn churned_table_keys_do_not_accumulate() {
    let mut host = Host::new();
    host.load("t", "t = {}").unwrap();
    let before = host.memory_usage();
    host.load("t", "for i = 1, 10000 do t[i] = true t[i] = nil end").unwrap();
    assert!(host.memory_usage() < before + 1024);
}
