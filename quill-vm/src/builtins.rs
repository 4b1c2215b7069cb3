// quill-vm - Bytecode compiler and virtual machine for the Quill programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The built-in function registry.
//!
//! An ordered, immutable table of host functions. Indices are stable and
//! form the operand of the get-builtin instruction, so reordering entries
//! changes compiled programs.

use crate::object::{Builtin, Object};
use crate::vm::RuntimeError;

/// All built-in functions, in registry order.
pub static BUILTINS: [Builtin; 2] = [
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "print",
        func: builtin_print,
    },
];

/// Fetch a builtin by registry index.
pub fn get(index: usize) -> Option<&'static Builtin> {
    BUILTINS.get(index)
}

fn builtin_len(args: &[Object]) -> Result<Object, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::WrongArity {
            want: 1,
            got: args.len(),
        });
    }
    match &args[0] {
        Object::Str(s) => Ok(Object::Int(s.len() as i64)),
        Object::Array(elements) => Ok(Object::Int(elements.len() as i64)),
        Object::Map(pairs) => Ok(Object::Int(pairs.len() as i64)),
        other => Err(RuntimeError::UnsupportedArgument {
            builtin: "len",
            got: other.type_name(),
        }),
    }
}

fn builtin_print(args: &[Object]) -> Result<Object, RuntimeError> {
    for arg in args {
        println!("{}", arg);
    }
    Ok(Object::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;
    use im::Vector;
    use std::rc::Rc;

    #[test]
    fn test_registry_order_is_stable() {
        assert_eq!(BUILTINS[0].name, "len");
        assert_eq!(BUILTINS[1].name, "print");
        assert!(get(2).is_none());
    }

    #[test]
    fn test_len() {
        let len = BUILTINS[0].func;
        assert_eq!(
            len(&[Object::Str(Rc::from("abc"))]).unwrap(),
            Object::Int(3)
        );
        assert_eq!(
            len(&[Object::Array(Vector::from(vec![Object::Int(1)]))]).unwrap(),
            Object::Int(1)
        );
        assert_eq!(len(&[Object::Map(im::OrdMap::new())]).unwrap(), Object::Int(0));
    }

    #[test]
    fn test_len_errors() {
        let len = BUILTINS[0].func;
        assert!(matches!(
            len(&[]),
            Err(RuntimeError::WrongArity { want: 1, got: 0 })
        ));
        assert!(matches!(
            len(&[Object::Int(1)]),
            Err(RuntimeError::UnsupportedArgument { builtin: "len", .. })
        ));
    }
}
