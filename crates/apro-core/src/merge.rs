//! Utilidades para fusionar JSON de pasos e instancias.
//!
//! Dos semánticas conviven aquí:
//! - `merge_json`: merge "shallow" donde las claves de `b` reemplazan a las de
//!   `a`. Se usa para el payload de un step (claves posteriores ganan).
//! - `deep_merge`: merge recursivo para el `form_data` de la instancia, donde
//!   los objetos anidados se combinan clave a clave en lugar de reemplazarse
//!   en bloque.

use serde_json::Value;

/// Merge shallow: keys from `b` override keys from `a` when both are objects.
/// Cuando alguno de los dos valores no es objeto, `b` tiene precedencia.
pub fn merge_json(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            let mut out = ma.clone();
            for (k, v) in mb.iter() {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        // Non-objects: override
        (_, other) => other.clone(),
    }
}

/// Merge recursivo: objetos anidados se combinan; para cualquier otro tipo,
/// `b` tiene precedencia.
pub fn deep_merge(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            let mut out = ma.clone();
            for (k, vb) in mb.iter() {
                let merged = match out.get(k) {
                    Some(va) => deep_merge(va, vb),
                    None => vb.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        (_, other) => other.clone(),
    }
}

/// `true` si el valor no aporta claves (None lógico para payloads de step).
pub fn is_empty_object(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shallow_merge_later_keys_win() {
        let a = json!({"x": 1, "y": {"a": 1}});
        let b = json!({"y": {"b": 2}, "z": 3});
        let m = merge_json(&a, &b);
        assert_eq!(m, json!({"x": 1, "y": {"b": 2}, "z": 3}));
    }

    #[test]
    fn deep_merge_combines_nested_objects() {
        let a = json!({"customer": {"tier": "gold", "region": "west"}, "amount": 10});
        let b = json!({"customer": {"region": "east"}});
        let m = deep_merge(&a, &b);
        assert_eq!(m, json!({"customer": {"tier": "gold", "region": "east"}, "amount": 10}));
    }

    #[test]
    fn deep_merge_non_object_overrides() {
        let a = json!({"k": {"nested": true}});
        let b = json!({"k": 7});
        assert_eq!(deep_merge(&a, &b), json!({"k": 7}));
    }

    #[test]
    fn empty_object_detection() {
        assert!(is_empty_object(&Value::Null));
        assert!(is_empty_object(&json!({})));
        assert!(!is_empty_object(&json!({"a": 1})));
        assert!(!is_empty_object(&json!(0)));
    }
}
