use std::{cell::RefCell, collections::BTreeMap, fs, path::PathBuf};

use skein::{
    bytecode::Symbol,
    compiler::{compile, CompileOptions, CompileResult},
    runtime,
    vm::{self, Callbacks, Parameter, Pointer, ScriptString},
};
use tempfile::TempDir;

struct Script {
    _dir: TempDir,
    path: PathBuf,
    result: CompileResult,
}

impl Script {
    fn compile(source: &str) -> Script {
        Script::compile_with(&[("main.skn", source)], &CompileOptions::default())
    }

    fn compile_with(files: &[(&str, &str)], options: &CompileOptions) -> Script {
        let dir = tempfile::tempdir().unwrap();
        for (name, source) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, source).unwrap();
        }
        let path = dir.path().join(files[0].0);
        let result = compile(&[path.clone()], options);
        Script {
            _dir: dir,
            path,
            result,
        }
    }

    fn bytecode(&self) -> &[u8] {
        assert_eq!(self.errors(), Vec::<String>::new());
        &self.result.compiled_files[&self.path]
    }

    fn errors(&self) -> Vec<String> {
        self.result.errors.iter().map(|e| e.to_string()).collect()
    }

    fn symbol(&self, descriptor: &str) -> Symbol {
        self.result.symbols[descriptor]
    }

    fn run_console(&self, input: &str) -> String {
        let mut out = vec![];
        runtime::run(
            self.bytecode(),
            &self.result.symbols,
            false,
            input.as_bytes(),
            &mut out,
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    }
}

#[test]
fn loops_with_break_and_continue() {
    let script = Script::compile(
        r#"
        #global { void print(...); }
        int32 total = 0;
        for (int32 i = 0; i < 10; i++) {
            if (i % 2 == 0) { continue; }
            if (i > 7) { break; }
            total += i;
        }
        uint8 countdown = 3;
        do {
            countdown--;
        } while (countdown > 0);
        print("total", total, countdown);
        "#,
    );
    assert_eq!(script.run_console(""), "total 16 0\n");
}

#[test]
fn strings_and_casts() {
    let script = Script::compile(
        r#"
        #global { void print(...); string readLine(); }
        string name = readLine();
        string greeting = "Hello, " + name + "!";
        int32 n = (int32)readLine();
        print(greeting, n * 2);
        print((string)(n > 3), 7 / 2.0 > 3.0 ? "big" : "small");
        "#,
    );
    assert_eq!(script.run_console("Ada\n21\n"), "Hello, Ada! 42\ntrue big\n");
}

#[test]
fn exit_stops_the_script() {
    let script = Script::compile(
        r#"
        #global { void print(...); }
        <? generated by a test ?>
        print("before");
        exit;
        print("after");
        "#,
    );
    assert_eq!(script.run_console(""), "<? generated by a test ?>\nbefore\n");
}

#[test]
fn imported_globals_are_shared() {
    let script = Script::compile_with(
        &[
            (
                "main.skn",
                "#import \"lib/console.skn\"\nscale = scale * 3;\nprint(scale);",
            ),
            ("lib/console.skn", "#import \"../api.skn\"\nint32 scale = 2;"),
            ("api.skn", runtime::CONSOLE_API),
        ],
        &CompileOptions::default(),
    );
    assert_eq!(script.run_console(""), "6\n");
}

#[test]
fn host_objects_through_callbacks() {
    let script = Script::compile(
        r#"
        #type Counter {
            int32 value;
            int32 add(int32 n);
            readonly string [int32 i];
        }
        #global { Counter counter; void print(...); }
        counter.value = 5;
        counter.value += counter.add(10);
        print(counter[2], counter.value);
        "#,
    );
    let counter = Pointer::from(7);
    let global_counter = script.symbol("GLOBAL_counter");
    let value = script.symbol("Counter_value");
    let add = script.symbol("Counter_add_int32");
    let print = script.symbol("GLOBAL_print_VARIADIC");

    let stored = RefCell::new(0i32);
    let printed = RefCell::new(vec![]);
    let mut callbacks = Callbacks::new()
        .on_invoke_function(|target, symbol, args| {
            if symbol == global_counter {
                Parameter::Pointer(counter)
            } else if symbol == value {
                assert_eq!(target, counter);
                Parameter::Int32(*stored.borrow())
            } else if symbol == add {
                let Parameter::Int32(n) = args[0] else {
                    panic!("unexpected argument {:?}", args[0]);
                };
                Parameter::Int32(*stored.borrow() + n)
            } else if symbol == print {
                printed
                    .borrow_mut()
                    .extend(args.iter().map(Parameter::to_text));
                Parameter::Uninitialized
            } else {
                panic!("unexpected symbol {symbol:?}");
            }
        })
        .on_assign_property(|target, symbol, assigned| {
            assert_eq!((target, symbol), (counter, value));
            let Parameter::Int32(v) = assigned else {
                panic!("unexpected value {assigned:?}");
            };
            *stored.borrow_mut() = v;
        })
        .on_invoke_subscript(|target, index| {
            assert_eq!(target, counter);
            Parameter::String(ScriptString::Owned(format!("item{}", index.to_text())))
        });

    vm::execute(script.bytecode(), &mut callbacks).unwrap();
    drop(callbacks);
    assert_eq!(*stored.borrow(), 20);
    assert_eq!(*printed.borrow(), vec!["item2".to_string(), "20".to_string()]);
}

#[test]
fn debug_builds_report_lines_and_variables() {
    let script = Script::compile_with(
        &[("main.skn", "int8 x = 1;\nx++;")],
        &CompileOptions {
            include_debug_bytes: true,
            ..CompileOptions::default()
        },
    );
    let mut out = vec![];
    runtime::run(script.bytecode(), &BTreeMap::new(), true, "".as_bytes(), &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "[line 1]\n[set x = 1]\n[line 2]\n[set x = 2]\n"
    );
}

#[test]
fn compile_errors_name_their_location() {
    let script = Script::compile("#global { void print(...); }\nprint(1);\nint32 x = \"text\";");
    let path = script.path.display().to_string();
    assert_eq!(
        script.errors(),
        vec![
            format!("{path}:2:7: Variadic parameters cannot be ambiguous literals. Add a typecast to specify the type."),
            format!("{path}:3:11: Expression is required to be of type int32, but was string instead."),
        ]
    );
    assert!(script.result.compiled_files.is_empty());
}
