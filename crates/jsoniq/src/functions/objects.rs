use itertools::Itertools;

use super::{FunctionRegistry, optional_argument};
use crate::item::Item;
use crate::runtime::error::Error;
use crate::runtime::iterators::{empty_sequence, project};

pub(super) fn register(reg: &mut FunctionRegistry) {
    reg.register_streaming("project", 2, |args, metadata| {
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(input), Some(keys)) => project(input, keys, metadata),
            _ => empty_sequence(metadata),
        }
    });

    // Distinct keys of every object in the input, in order of first appearance.
    reg.register_fn("keys", 1, |_call, args| {
        Ok(args[0].iter().flat_map(Item::keys).unique().map(Item::string).collect())
    });

    reg.register_fn("values", 1, |_call, args| {
        Ok(args[0].iter().filter_map(Item::as_object).flat_map(|o| o.values().cloned()).collect())
    });

    reg.register_fn("size", 1, |_call, args| {
        let Some(item) = optional_argument(args, 0, "size")? else {
            return Ok(vec![]);
        };
        let members = item.as_array().ok_or_else(|| {
            Error::unexpected_type(format!("size() expects an array, found an item of type \"{}\"", item.type_name()))
        })?;
        let size = i32::try_from(members.len()).map(Item::Int).unwrap_or_else(|_| Item::integer(members.len()));
        Ok(vec![size])
    });

    reg.register_fn("members", 1, |_call, args| Ok(args[0].iter().flat_map(|a| a.members().to_vec()).collect()));
}

#[cfg(test)]
mod tests {
    use crate::functions::default_function_registry;
    use crate::item::Item;
    use crate::runtime::error::ErrorCode;
    use crate::runtime::iterators::{constant, sequence};
    use crate::runtime::{DynamicContext, Metadata, Result, RuntimeIterator};
    use serde_json::json;

    fn md() -> Metadata {
        Metadata::default()
    }

    fn call(name: &str, args: Vec<Vec<Item>>) -> Result<Vec<Item>> {
        let args = args.into_iter().map(|a| sequence(a, md())).collect();
        let mut it = default_function_registry().build_call(name, args, md())?;
        it.materialize(&DynamicContext::empty())
    }

    fn objects() -> Vec<Item> {
        vec![
            Item::from_json(&json!({"a": 1, "b": 2})),
            Item::Int(0),
            Item::from_json(&json!({"c": 3, "a": 4})),
        ]
    }

    #[test]
    fn keys_are_distinct_in_first_occurrence_order() {
        let keys = call("keys", vec![objects()]).unwrap();
        assert_eq!(keys, vec![Item::string("a"), Item::string("b"), Item::string("c")]);
    }

    #[test]
    fn values_flatten_objects() {
        assert_eq!(
            call("values", vec![objects()]).unwrap(),
            vec![Item::Int(1), Item::Int(2), Item::Int(3), Item::Int(4)]
        );
    }

    #[test]
    fn size_and_members() {
        let arrays = vec![Item::from_json(&json!([1, 2])), Item::from_json(&json!([3]))];
        assert_eq!(call("members", vec![arrays.clone()]).unwrap(), vec![Item::Int(1), Item::Int(2), Item::Int(3)]);
        assert_eq!(call("size", vec![vec![arrays[0].clone()]]).unwrap(), vec![Item::Int(2)]);
        assert!(call("size", vec![vec![]]).unwrap().is_empty());
        assert_eq!(call("size", vec![vec![Item::Int(1)]]).unwrap_err().code, ErrorCode::XPTY0004);
    }

    #[test]
    fn project_is_a_streaming_builtin() {
        let mut it = default_function_registry()
            .build_call("project", vec![sequence(objects(), md()), constant(Item::string("a"), md())], md())
            .unwrap();
        assert_eq!(
            it.materialize(&DynamicContext::empty()).unwrap(),
            vec![Item::from_json(&json!({"a": 1})), Item::Int(0), Item::from_json(&json!({"a": 4}))]
        );
    }
}
