mod common;

use anyhow::Result;
use evalnet::{BindError, BindingKind, EvalError, InvokeError, TypeDescriptor, Value};

use common::manager;

#[test]
fn add_scenario_recompiles_only_on_type_change() -> Result<()> {
    let (backend, manager) = manager();
    let handle = manager.create("return a + b;");
    manager.set_parameter(handle, "a", TypeDescriptor::Int32, 2_i32)?;
    manager.set_parameter(handle, "b", TypeDescriptor::Int32, 3_i32)?;

    assert_eq!(manager.evaluate(handle)?, Value::Int32(5));
    assert_eq!(backend.compiles(), 1);
    let compiled = manager.delegate_fingerprint(handle)?;
    assert!(compiled.is_some());

    manager.set_parameter(handle, "b", TypeDescriptor::Int32, 10_i32)?;
    assert_eq!(manager.delegate_fingerprint(handle)?, compiled);
    assert_eq!(manager.evaluate(handle)?, Value::Int32(12));
    assert_eq!(backend.compiles(), 1);

    manager.set_parameter(handle, "b", TypeDescriptor::String, "x")?;
    assert_eq!(manager.delegate_fingerprint(handle)?, None);
    let err = match manager.evaluate(handle) {
        Err(EvalError::Compile(err)) => err,
        other => panic!("expected a compile error, got {other:?}"),
    };
    assert_eq!(backend.compiles(), 2);
    assert!(err.diagnostics().iter().any(|d| d.message().contains("integers and strings")));
    assert!(err.render("return a + b;").contains("integers and strings"));
    Ok(())
}

#[test]
fn fingerprint_ignores_parameter_declaration_order() -> Result<()> {
    let (_, manager) = manager();
    let forward = manager.create("return a + b + c;");
    let backward = manager.create("return a + b + c;");

    let declared = [
        ("a", TypeDescriptor::Int32),
        ("b", TypeDescriptor::Int64),
        ("c", TypeDescriptor::Int16),
    ];
    for (name, ty) in declared {
        manager.set_parameter(forward, name, ty, Value::Null)?;
    }
    for (name, ty) in declared.into_iter().rev() {
        manager.set_parameter(backward, name, ty, Value::Null)?;
    }

    assert_eq!(manager.fingerprint(forward)?, manager.fingerprint(backward)?);
    Ok(())
}

#[test]
fn type_change_triggers_exactly_one_recompile() -> Result<()> {
    let (backend, manager) = manager();
    let handle = manager.create("return a + 1;");
    manager.set_parameter(handle, "a", TypeDescriptor::Int32, 1_i32)?;
    manager.evaluate(handle)?;

    manager.set_parameter(handle, "a", TypeDescriptor::Int64, 41_i64)?;
    assert_eq!(manager.evaluate(handle)?, Value::Int64(42));
    assert_eq!(manager.evaluate(handle)?, Value::Int64(42));
    assert_eq!(backend.compiles(), 2);
    assert_eq!(manager.cache_delegate_count(), 2);

    // Switching back reuses the delegate compiled for the original signature.
    manager.set_parameter(handle, "a", TypeDescriptor::Int32, 1_i32)?;
    assert_eq!(manager.evaluate(handle)?, Value::Int32(2));
    assert_eq!(backend.compiles(), 2);
    Ok(())
}

#[test]
fn disposed_handles_are_not_found() -> Result<()> {
    let (_, manager) = manager();
    let handle = manager.create("return a;");
    manager.set_value(handle, "a", 1_i32)?;
    manager.evaluate(handle)?;

    assert!(manager.dispose(handle));
    assert!(matches!(manager.evaluate(handle), Err(EvalError::NotFound(h)) if h == handle));
    assert!(!manager.dispose(handle));
    assert_eq!(manager.cache_item_count(), 0);
    Ok(())
}

#[test]
fn runtime_failures_leave_handle_usable() -> Result<()> {
    let (backend, manager) = manager();
    let handle = manager.create("return a + 1;");
    manager.set_value(handle, "a", i32::MAX)?;

    let err = manager.evaluate(handle).unwrap_err();
    assert!(matches!(err, EvalError::Evaluation(InvokeError::Runtime(_))));
    assert!(manager.delegate_fingerprint(handle)?.is_some());

    manager.set_value(handle, "a", 1_i32)?;
    assert_eq!(manager.evaluate(handle)?, Value::Int32(2));
    assert_eq!(backend.compiles(), 1);
    Ok(())
}

#[test]
fn evaluate_as_reports_conversion_failures() -> Result<()> {
    let (_, manager) = manager();
    let handle = manager.create("return a + b;");
    manager.set_value(handle, "a", "4")?;
    manager.set_value(handle, "b", "2")?;

    assert_eq!(manager.evaluate_as::<String>(handle)?, "42");
    assert_eq!(manager.evaluate_as::<i64>(handle)?, 42);

    manager.set_value(handle, "b", "x")?;
    assert!(matches!(manager.evaluate_as::<i32>(handle), Err(EvalError::Conversion(_))));
    Ok(())
}

#[test]
fn every_binding_convention_adds() -> Result<()> {
    let (_, manager) = manager();
    for binding in BindingKind::ALL {
        let handle = manager.create_with("return a + b;", binding);
        manager.set_parameter(handle, "a", TypeDescriptor::Int32, 2_i32)?;
        manager.set_parameter(handle, "b", TypeDescriptor::Int32, 3_i32)?;
        assert_eq!(manager.evaluate(handle)?, Value::Int32(5), "{binding}");
    }
    assert_eq!(manager.cache_delegate_count(), BindingKind::ALL.len());
    Ok(())
}

#[test]
fn dictionary_binding_converts_to_declared_type() -> Result<()> {
    let (_, manager) = manager();
    let handle = manager.create_with("return a + b;", BindingKind::Dictionary);
    manager.set_parameter(handle, "a", TypeDescriptor::Int32, 2_i64)?;
    manager.set_parameter(handle, "b", TypeDescriptor::Int32, "3")?;

    assert_eq!(manager.evaluate(handle)?, Value::Int32(5));
    Ok(())
}

#[test]
fn typed_binding_rejects_mismatched_values() -> Result<()> {
    let (_, manager) = manager();
    let handle = manager.create_with("return a + b;", BindingKind::Typed);
    manager.set_parameter(handle, "a", TypeDescriptor::Int32, 2_i32)?;
    manager.set_parameter(handle, "b", TypeDescriptor::Int32, 3_i64)?;

    let err = manager.evaluate(handle).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Evaluation(InvokeError::Bind(BindError::TypeMismatch {
            expected: TypeDescriptor::Int32,
            found: TypeDescriptor::Int64,
            ..
        }))
    ));
    Ok(())
}

#[test]
fn untyped_binding_defers_type_checks_to_runtime() -> Result<()> {
    let (backend, manager) = manager();
    let handle = manager.create_with("return a + b;", BindingKind::Untyped);
    manager.set_parameter(handle, "a", TypeDescriptor::Object, 2_i32)?;
    manager.set_parameter(handle, "b", TypeDescriptor::Object, 3_i32)?;
    assert_eq!(manager.evaluate(handle)?, Value::Int32(5));

    manager.set_parameter(handle, "b", TypeDescriptor::Object, "x")?;
    assert!(matches!(manager.evaluate(handle), Err(EvalError::Evaluation(_))));
    assert_eq!(backend.compiles(), 1);
    Ok(())
}

#[test]
fn single_dictionary_binding_looks_up_at_runtime() -> Result<()> {
    let (_, manager) = manager();
    let handle = manager.create_with("return a + b;", BindingKind::SingleDictionary);
    manager.set_value(handle, "a", "con")?;
    manager.set_value(handle, "b", "cat")?;
    assert_eq!(manager.evaluate(handle)?, Value::from("concat"));

    let missing = manager.create_with("return a + z;", BindingKind::SingleDictionary);
    manager.set_value(missing, "a", 1_i32)?;
    assert!(matches!(
        manager.evaluate(missing),
        Err(EvalError::Evaluation(InvokeError::Runtime(_)))
    ));
    Ok(())
}

#[test]
fn unknown_identifiers_are_compile_errors() -> Result<()> {
    let (_, manager) = manager();
    let handle = manager.create("return a + bb;");
    manager.set_value(handle, "a", 1_i32)?;

    let Err(EvalError::Compile(err)) = manager.evaluate(handle) else {
        panic!("expected a compile error");
    };
    assert_eq!(err.diagnostics()[0].span(), Some(11..13));
    Ok(())
}

#[test]
fn snippet_without_parameters_compiles() -> Result<()> {
    let (_, manager) = manager();
    let handle = manager.create("return 40 + 2;");
    assert_eq!(manager.evaluate_as::<i32>(handle)?, 42);
    Ok(())
}
