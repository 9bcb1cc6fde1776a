//! Evaluador de condiciones para aristas condicionales.
//!
//! Gramática mínima: `grupo-OR (|| grupo-OR)*`, donde cada grupo es
//! `parte-AND (&& parte-AND)*` y cada parte es `<ruta> <op> <literal>` con
//! `op ∈ {==, !=, >, >=, <, <=}`. Los grupos OR cortocircuitan en el primer
//! grupo verdadero; dentro de un grupo, las partes AND cortocircuitan en la
//! primera falsa.
//!
//! Semántica de leniencia heredada del diseño original: una expresión que no
//! parsea evalúa a `false` (la arista queda inerte) en lugar de bloquear la
//! instancia completa. Se emite un `warn!` para que sea diagnosticable.

use serde_json::Value;

use crate::graph::GraphEdge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

// El orden importa: los operadores de dos caracteres se buscan antes que sus
// prefijos de un carácter.
const OPS: [(&str, Op); 6] = [(">=", Op::Ge),
                              ("<=", Op::Le),
                              ("==", Op::Eq),
                              ("!=", Op::Ne),
                              (">", Op::Gt),
                              ("<", Op::Lt)];

/// Literal normalizado del lado derecho de una comparación.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Bool(bool),
    Num(f64),
    Str(String),
}

/// Normaliza el literal: quita comillas envolventes, `true`/`false` sin
/// distinguir mayúsculas pasa a booleano, numérico pasa a número, el resto
/// queda como cadena.
fn normalize_literal(raw: &str) -> Literal {
    let t = raw.trim();
    let unquoted = strip_quotes(t);
    if unquoted.eq_ignore_ascii_case("true") {
        return Literal::Bool(true);
    }
    if unquoted.eq_ignore_ascii_case("false") {
        return Literal::Bool(false);
    }
    if let Ok(n) = unquoted.parse::<f64>() {
        return Literal::Num(n);
    }
    Literal::Str(unquoted.to_string())
}

fn strip_quotes(s: &str) -> &str {
    let b = s.as_bytes();
    if b.len() >= 2 && ((b[0] == b'"' && b[b.len() - 1] == b'"') || (b[0] == b'\'' && b[b.len() - 1] == b'\'')) {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Resuelve una ruta con puntos (`customer.tier`) contra el contexto. Rutas
/// ausentes resuelven a `None` (valor ausente, no error).
fn resolve_path<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = ctx;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current)
}

/// Coerción numérica laxa: números y cadenas numéricas cuentan como número.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Igualdad laxa: cadena numérica vs número comparan igual; booleanos aceptan
/// su forma textual. Un valor ausente/null nunca es igual a un literal.
fn loose_eq(value: Option<&Value>, lit: &Literal) -> bool {
    let v = match value {
        None | Some(Value::Null) => return false,
        Some(v) => v,
    };
    match lit {
        Literal::Num(n) => as_number(v) == Some(*n),
        Literal::Bool(b) => match v {
            Value::Bool(vb) => vb == b,
            Value::String(s) => s.eq_ignore_ascii_case(if *b { "true" } else { "false" }),
            _ => false,
        },
        Literal::Str(s) => v.as_str() == Some(s.as_str()),
    }
}

/// Evalúa una parte AND (`ruta op literal`). Sin operador reconocible
/// devuelve `false` y deja traza.
fn eval_part(part: &str, ctx: &Value) -> bool {
    let (op, idx, token) = match OPS.iter().find_map(|(tok, op)| part.find(*tok).map(|i| (*op, i, *tok))) {
        Some(found) => found,
        None => {
            log::warn!("condition part without comparison operator: '{}'", part.trim());
            return false;
        }
    };
    let path = part[..idx].trim();
    let lit = normalize_literal(&part[idx + token.len()..]);
    let value = resolve_path(ctx, path);

    match op {
        Op::Eq => loose_eq(value, &lit),
        Op::Ne => !loose_eq(value, &lit),
        // Relacionales: ambos lados deben ser numéricos, si no la
        // comparación es falsa.
        Op::Gt | Op::Ge | Op::Lt | Op::Le => {
            let lhs = match value.and_then(as_number) {
                Some(n) => n,
                None => return false,
            };
            let rhs = match lit {
                Literal::Num(n) => n,
                _ => return false,
            };
            match op {
                Op::Gt => lhs > rhs,
                Op::Ge => lhs >= rhs,
                Op::Lt => lhs < rhs,
                Op::Le => lhs <= rhs,
                _ => unreachable!(),
            }
        }
    }
}

/// Evalúa la expresión completa contra el contexto de la instancia.
pub fn evaluate(expr: &str, ctx: &Value) -> bool {
    expr.split("||")
        .any(|group| group.split("&&").all(|part| eval_part(part, ctx)))
}

/// Selecciona exactamente una arista saliente de un nodo `condition`:
/// 1. la primera arista (en orden de definición) cuya condición evalúa true;
/// 2. si ninguna, la primera arista sin condición marcada `isDefault`;
/// 3. si tampoco, la primera arista;
/// 4. sin aristas, `None` (el llamador lo trata como fin del avance).
pub fn select_edge<'a>(edges: &'a [GraphEdge], ctx: &Value) -> Option<&'a GraphEdge> {
    for e in edges {
        if let Some(cond) = &e.condition {
            if evaluate(cond, ctx) {
                return Some(e);
            }
        }
    }
    edges.iter()
         .find(|e| e.condition.is_none() && e.is_default)
         .or_else(|| edges.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edge(target: &str, condition: Option<&str>, is_default: bool) -> GraphEdge {
        GraphEdge { source: "c".into(),
                    target: target.into(),
                    condition: condition.map(|s| s.to_string()),
                    is_default }
    }

    #[test]
    fn numeric_comparisons() {
        let ctx = json!({"amount": 150000});
        assert!(evaluate("amount >= 100000", &ctx));
        assert!(evaluate("amount > 149999.5", &ctx));
        assert!(!evaluate("amount < 1000", &ctx));
        assert!(evaluate("amount <= 150000", &ctx));
    }

    #[test]
    fn dotted_paths_and_missing_keys() {
        let ctx = json!({"customer": {"tier": "gold"}});
        assert!(evaluate("customer.tier == gold", &ctx));
        assert!(!evaluate("customer.tier == silver", &ctx));
        // Ruta ausente: == falso, != verdadero
        assert!(!evaluate("customer.country == AR", &ctx));
        assert!(evaluate("customer.country != AR", &ctx));
    }

    #[test]
    fn loose_equality_numeric_string() {
        let ctx = json!({"amount": "150", "code": 7});
        assert!(evaluate("amount == 150", &ctx));
        assert!(evaluate("code == 7", &ctx));
        // Literal entre comillas numérico también coacciona
        assert!(evaluate("code == '7'", &ctx));
    }

    #[test]
    fn boolean_literals_case_insensitive() {
        let ctx = json!({"urgent": true, "flag": "TRUE"});
        assert!(evaluate("urgent == true", &ctx));
        assert!(evaluate("urgent != FALSE", &ctx));
        assert!(evaluate("flag == true", &ctx));
    }

    #[test]
    fn quoted_string_literals() {
        let ctx = json!({"region": "west coast"});
        assert!(evaluate("region == \"west coast\"", &ctx));
        assert!(evaluate("region == 'west coast'", &ctx));
    }

    #[test]
    fn and_or_short_circuit() {
        let ctx = json!({"amount": 500, "tier": "gold"});
        assert!(evaluate("amount > 100 && tier == gold", &ctx));
        assert!(!evaluate("amount > 1000 && tier == gold", &ctx));
        assert!(evaluate("amount > 1000 || tier == gold", &ctx));
        assert!(evaluate("amount > 1000 && tier == x || amount == 500", &ctx));
    }

    #[test]
    fn relational_on_non_numeric_is_false() {
        let ctx = json!({"tier": "gold"});
        assert!(!evaluate("tier > 10", &ctx));
        assert!(!evaluate("tier >= gold", &ctx));
    }

    #[test]
    fn malformed_expression_is_false_not_error() {
        let ctx = json!({"amount": 5});
        assert!(!evaluate("amount", &ctx));
        assert!(!evaluate("", &ctx));
        assert!(!evaluate("&&", &ctx));
    }

    #[test]
    fn edge_selection_first_true_condition_wins() {
        let edges = vec![edge("cfo", Some("amount >= 100000"), false),
                         edge("vp", Some("amount >= 10000"), false),
                         edge("director", None, true)];
        let ctx = json!({"amount": 150000});
        assert_eq!(select_edge(&edges, &ctx).unwrap().target, "cfo");
        let ctx = json!({"amount": 20000});
        assert_eq!(select_edge(&edges, &ctx).unwrap().target, "vp");
    }

    #[test]
    fn edge_selection_default_then_first_fallback() {
        let edges = vec![edge("a", Some("amount >= 100000"), false),
                         edge("b", None, true)];
        assert_eq!(select_edge(&edges, &json!({"amount": 1})).unwrap().target, "b");

        let edges = vec![edge("a", Some("amount >= 100000"), false),
                         edge("b", None, false)];
        assert_eq!(select_edge(&edges, &json!({"amount": 1})).unwrap().target, "a");

        assert!(select_edge(&[], &json!({})).is_none());
    }
}
