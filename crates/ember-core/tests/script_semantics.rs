use ember_core::{compile, ErrorKind, Host, Value};

fn run(source: &str) -> Host {
    let mut host = Host::new();
    if let Err(err) = host.load("test", source) {
        panic!("script failed: {err}");
    }
    host
}

#[test]
fn arithmetic_keeps_integers_and_floats_apart() {
    let mut host = run(
        r#"
        a = 7 // 2
        b = 7 / 2
        c = 2 ^ 10
        d = -7 % 3
        e = 1 + 2 * 3 - 4
        f = "10" + 5
        g = 0x10 + 1
        "#,
    );
    assert_eq!(host.get::<i64>("a").unwrap(), 3);
    assert_eq!(host.get::<f64>("b").unwrap(), 3.5);
    assert_eq!(host.get::<f64>("c").unwrap(), 1024.0);
    assert_eq!(host.get::<i64>("d").unwrap(), 2);
    assert_eq!(host.get::<i64>("e").unwrap(), 3);
    assert_eq!(host.get::<i64>("f").unwrap(), 15);
    assert_eq!(host.get::<i64>("g").unwrap(), 17);
}

#[test]
fn precedence_and_associativity() {
    let mut host = run(
        r#"
        p = -2 ^ 2
        q = 2 ^ 3 ^ 2
        r = "a" .. "b" .. 1 + 2
        s = not nil == true
        t = 1 < 2 and 2 < 3
        "#,
    );
    assert_eq!(host.get::<f64>("p").unwrap(), -4.0);
    assert_eq!(host.get::<f64>("q").unwrap(), 512.0);
    assert_eq!(host.get::<String>("r").unwrap(), "ab3");
    assert!(host.get::<bool>("s").unwrap());
    assert!(host.get::<bool>("t").unwrap());
}

#[test]
fn logical_operators_short_circuit() {
    let mut host = run(
        r#"
        calls = 0
        function bump() calls = calls + 1 return true end
        a = false and bump()
        b = true or bump()
        c = nil or "fallback"
        d = 1 and 2
        "#,
    );
    assert_eq!(host.get::<i64>("calls").unwrap(), 0);
    assert!(!host.get::<bool>("a").unwrap());
    assert!(host.get::<bool>("b").unwrap());
    assert_eq!(host.get::<String>("c").unwrap(), "fallback");
    assert_eq!(host.get::<i64>("d").unwrap(), 2);
}

#[test]
fn control_flow() {
    let mut host = run(
        r#"
        local total = 0
        for i = 1, 10 do
            if i % 2 == 0 then
                total = total + i
            elseif i == 5 then
                total = total + 100
            else
                total = total - 1
            end
        end
        evens = total

        local n = 0
        while true do
            n = n + 1
            if n >= 4 then break end
        end
        loops = n

        local k = 10
        repeat local next_k = k - 3 k = next_k until next_k < 0
        remainder = k

        steps = 0
        for x = 1.0, 2.0, 0.25 do steps = steps + 1 end
        down = ""
        for i = 3, 1, -1 do down = down .. i end
        "#,
    );
    assert_eq!(host.get::<i64>("evens").unwrap(), 30 + 100 - 4);
    assert_eq!(host.get::<i64>("loops").unwrap(), 4);
    assert_eq!(host.get::<i64>("remainder").unwrap(), -2);
    assert_eq!(host.get::<i64>("steps").unwrap(), 5);
    assert_eq!(host.get::<String>("down").unwrap(), "321");
}

#[test]
fn functions_recursion_and_multiple_returns() {
    let mut host = run(
        r#"
        function fib(n)
            if n < 2 then return n end
            return fib(n - 1) + fib(n - 2)
        end
        function pair() return 1, 2 end
        f = fib(15)
        local a, b, c = pair()
        missing = c
        sum = a + b
        x, y = 1, 2
        x, y = y, x
        packed = #{pair(), pair()}
        "#,
    );
    assert_eq!(host.get::<i64>("f").unwrap(), 610);
    assert_eq!(host.get::<Value>("missing").unwrap(), Value::Nil);
    assert_eq!(host.get::<i64>("sum").unwrap(), 3);
    assert_eq!(host.get::<i64>("x").unwrap(), 2);
    assert_eq!(host.get::<i64>("y").unwrap(), 1);
    assert_eq!(host.get::<i64>("packed").unwrap(), 3);
}

#[test]
fn tables_and_methods() {
    let mut host = run(
        r#"
        counter = { count = 0, ["step"] = 2, 10, 20 }
        function counter:bump(times)
            for _ = 1, times do self.count = self.count + self.step end
            return self.count
        end
        result = counter:bump(3)
        first = counter[1]
        size = #counter
        nested = { inner = { value = "deep" } }
        deep = nested.inner.value
        local key = "dyn"
        counter[key] = true
        dynamic = counter.dyn
        "#,
    );
    assert_eq!(host.get::<i64>("result").unwrap(), 6);
    assert_eq!(host.get::<i64>("counter.count").unwrap(), 6);
    assert_eq!(host.get::<i64>("first").unwrap(), 10);
    assert_eq!(host.get::<i64>("size").unwrap(), 2);
    assert_eq!(host.get::<String>("deep").unwrap(), "deep");
    assert!(host.get::<bool>("dynamic").unwrap());
}

#[test]
fn dotted_function_definitions_populate_tables() {
    let mut host = run(
        r#"
        ui = { panel = {} }
        function ui.panel.title() return "Main" end
        name = ui.panel.title()
        "#,
    );
    assert_eq!(host.get::<String>("name").unwrap(), "Main");
    host.call("ui.panel.title", 0).unwrap();
    assert_eq!(host.pop::<String>().unwrap(), "Main");
}

#[test]
fn enclosing_locals_are_a_load_error() {
    let mut host = Host::new();
    let err = host
        .load("closure", "local hidden = 1\nfunction peek() return hidden end")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.to_string().starts_with("closure:2:"));
}

#[test]
fn runtime_errors_name_the_line() {
    let mut host = Host::new();
    let err = host.load("lines", "local t = {}\n\nlocal v = t.missing.field").unwrap_err();
    assert_eq!(err.to_string(), "lines:3: attempt to index a nil value");

    let err = host.load("cmp", "return 1 < 'x'").unwrap_err();
    assert_eq!(err.to_string(), "cmp:1: attempt to compare number with string");
}

#[test]
fn deeply_nested_source_is_rejected_not_fatal() {
    let deep = format!("x = {}1{}", "(".repeat(200_000), ")".repeat(200_000));

    let mut host = Host::new();
    let err = host.load("deep", deep.as_str()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert_eq!(err.to_string(), "deep:1: chunk has too many syntax levels");

    let mut diagnostics = Vec::new();
    let err = compile("deep", &deep, |_| true, |text| diagnostics.push(text.to_string()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compile);
    assert_eq!(diagnostics, vec!["deep:1: chunk has too many syntax levels".to_string()]);

    let shallow = format!("x = {}1{}", "(".repeat(50), ")".repeat(50));
    host.load("shallow", shallow.as_str()).unwrap();
    assert_eq!(host.get::<i64>("x").unwrap(), 1);
}

#[test]
fn extreme_integer_division_wraps() {
    let mut host = run("q = math.mininteger // -1 r = math.mininteger % -1");
    assert_eq!(host.get::<i64>("q").unwrap(), i64::MIN);
    assert_eq!(host.get::<i64>("r").unwrap(), 0);
}
