//! Translation of document-style raw queries into SQL conditions over the
//! stored JSON.
//!
//! Supported: `{"field": value}` equality on dotted paths, the comparison
//! operators `$eq $ne $gt $gte $lt $lte $in $nin $exists`, and the logical
//! operators `$and $or $nor`. Values must be scalars or `null`.

use super::{BackendError, Result};

use sea_orm::{
	sea_query::{Condition, Expr, SimpleExpr},
	Value as DbValue,
};
use serde_json::Value;

fn malformed(message: impl Into<String>) -> BackendError {
	BackendError::MalformedQuery(message.into())
}

pub(crate) fn translate(query: &Value) -> Result<Condition> {
	let Value::Object(clauses) = query else {
		return Err(malformed("a raw query must be a JSON object"));
	};

	clauses
		.iter()
		.try_fold(Condition::all(), |cond, (key, value)| Ok(cond.add(clause(key, value)?)))
}

fn clause(key: &str, value: &Value) -> Result<Condition> {
	match key {
		"$and" => Ok(subqueries(key, value)?.into_iter().fold(Condition::all(), Condition::add)),
		"$or" => Ok(subqueries(key, value)?.into_iter().fold(Condition::any(), Condition::add)),
		"$nor" => Ok(subqueries(key, value)?
			.into_iter()
			.fold(Condition::any(), Condition::add)
			.not()),
		op if op.starts_with('$') => Err(malformed(format!("unsupported top-level operator `{op}`"))),
		field => field_condition(field, value),
	}
}

fn subqueries(op: &str, value: &Value) -> Result<Vec<Condition>> {
	match value {
		Value::Array(items) if !items.is_empty() => items.iter().map(translate).collect(),
		_ => Err(malformed(format!("`{op}` expects a non-empty list of queries"))),
	}
}

/// `a.b.c` as a quoted JSON path, `$."a"."b"."c"`
fn json_path(field: &str) -> Result<String> {
	let mut path = String::from("$");
	for segment in field.split('.') {
		if segment.is_empty() || segment.contains('"') {
			return Err(malformed(format!("invalid field path `{field}`")));
		}
		path.push_str(&format!(".\"{segment}\""));
	}
	Ok(path)
}

fn scalar(value: &Value) -> Result<DbValue> {
	match value {
		Value::String(s) => Ok(s.clone().into()),
		Value::Bool(b) => Ok((*b).into()),
		Value::Number(n) => n
			.as_i64()
			.map(DbValue::from)
			.or_else(|| n.as_f64().map(DbValue::from))
			.ok_or_else(|| malformed(format!("unsupported number {n}"))),
		other => Err(malformed(format!("unsupported operand {other}, expected a scalar"))),
	}
}

fn field_condition(field: &str, value: &Value) -> Result<Condition> {
	let path = json_path(field)?;

	match value {
		Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops
			.iter()
			.try_fold(Condition::all(), |cond, (op, operand)| {
				Ok(cond.add(operator(&path, op, operand)?))
			}),
		Value::Object(_) | Value::Array(_) => Err(malformed(format!(
			"matching `{field}` against a whole object or list is not supported"
		))),
		_ => Ok(Condition::all().add(equals(&path, value)?)),
	}
}

fn equals(path: &str, value: &Value) -> Result<SimpleExpr> {
	if value.is_null() {
		return Ok(Expr::cust_with_values("json_extract(document, ?) IS NULL", [path]));
	}
	Ok(Expr::cust_with_values(
		"json_extract(document, ?) = ?",
		[DbValue::from(path), scalar(value)?],
	))
}

fn operator(path: &str, op: &str, operand: &Value) -> Result<SimpleExpr> {
	let compare = |sql_op: &str| -> Result<SimpleExpr> {
		Ok(Expr::cust_with_values(
			format!("json_extract(document, ?) {sql_op} ?"),
			[DbValue::from(path), scalar(operand)?],
		))
	};

	match op {
		"$eq" => equals(path, operand),
		"$ne" if operand.is_null() => Ok(Expr::cust_with_values(
			"json_extract(document, ?) IS NOT NULL",
			[path],
		)),
		"$ne" => Ok(Expr::cust_with_values(
			"(json_extract(document, ?) IS NULL OR json_extract(document, ?) <> ?)",
			[DbValue::from(path), DbValue::from(path), scalar(operand)?],
		)),
		"$gt" => compare(">"),
		"$gte" => compare(">="),
		"$lt" => compare("<"),
		"$lte" => compare("<="),
		"$in" => membership(path, operand, true),
		"$nin" => membership(path, operand, false),
		"$exists" => match operand {
			Value::Bool(true) => Ok(Expr::cust_with_values("json_type(document, ?) IS NOT NULL", [path])),
			Value::Bool(false) => Ok(Expr::cust_with_values("json_type(document, ?) IS NULL", [path])),
			_ => Err(malformed("`$exists` expects a boolean")),
		},
		other => Err(malformed(format!("unsupported operator `{other}`"))),
	}
}

/// `$in` and `$nin`. A `null` in the list stands for a missing or null field.
fn membership(path: &str, operand: &Value, inclusive: bool) -> Result<SimpleExpr> {
	let Value::Array(items) = operand else {
		return Err(malformed("`$in` and `$nin` expect a list"));
	};

	let with_null = items.iter().any(Value::is_null);
	let values = items
		.iter()
		.filter(|v| !v.is_null())
		.map(scalar)
		.collect::<Result<Vec<_>>>()?;

	let is_null = "json_extract(document, ?) IS NULL";
	let in_list = if values.is_empty() {
		None
	} else {
		let marks = vec!["?"; values.len()].join(", ");
		let keyword = if inclusive { "IN" } else { "NOT IN" };
		Some(format!("json_extract(document, ?) {keyword} ({marks})"))
	};

	let mut binds = Vec::with_capacity(values.len() + 2);
	let sql = match (inclusive, with_null, in_list) {
		(true, false, None) => "1 = 0".to_string(),
		(false, false, None) => "1 = 1".to_string(),
		(true, true, None) => {
			binds.push(DbValue::from(path));
			is_null.to_string()
		}
		(false, true, None) => {
			binds.push(DbValue::from(path));
			"json_extract(document, ?) IS NOT NULL".to_string()
		}
		(true, false, Some(in_list)) => {
			binds.push(DbValue::from(path));
			in_list
		}
		(true, true, Some(in_list)) => {
			binds.extend([DbValue::from(path), DbValue::from(path)]);
			format!("({is_null} OR {in_list})")
		}
		(false, false, Some(in_list)) => {
			binds.extend([DbValue::from(path), DbValue::from(path)]);
			format!("({is_null} OR {in_list})")
		}
		(false, true, Some(in_list)) => {
			binds.push(DbValue::from(path));
			format!("({in_list})")
		}
	};
	binds.extend(values);

	Ok(Expr::cust_with_values(sql, binds))
}

#[cfg(test)]
mod tests {
	use super::*;
	use sea_orm::sea_query::{Alias, Asterisk, Query, SqliteQueryBuilder};
	use serde_json::json;

	fn sql(query: Value) -> String {
		Query::select()
			.column(Asterisk)
			.from(Alias::new("entities"))
			.cond_where(translate(&query).unwrap())
			.to_string(SqliteQueryBuilder)
	}

	#[test]
	fn equality_on_dotted_paths() {
		let sql = sql(json!({"name": "Cat", "meta.version": 3}));
		assert!(sql.contains(r#"json_extract(document, '$."name"') = 'Cat'"#), "{sql}");
		assert!(sql.contains(r#"json_extract(document, '$."meta"."version"') = 3"#), "{sql}");
	}

	#[test]
	fn logical_operators() {
		let sql = sql(json!({"$or": [{"name": "Cat"}, {"name": "Dog"}]}));
		assert!(sql.contains(" OR "), "{sql}");

		let sql_nor = super::translate(&json!({"$nor": [{"name": "Cat"}]}));
		assert!(sql_nor.is_ok());
	}

	#[test]
	fn membership_lists() {
		let sql = sql(json!({"version": {"$in": ["0.1", "0.2"]}}));
		assert!(sql.contains("IN ('0.1', '0.2')"), "{sql}");
	}

	#[test]
	fn rejects_what_it_cannot_translate() {
		for query in [
			json!(["not", "an", "object"]),
			json!({"$where": "1"}),
			json!({"name": {"$regex": "C.*"}}),
			json!({"properties": {"name": "x"}}),
			json!({"$or": []}),
			json!({"a..b": 1}),
			json!({"name": {"$in": "Cat"}}),
			json!({"name": {"$exists": 1}}),
		] {
			assert!(
				matches!(translate(&query), Err(BackendError::MalformedQuery(_))),
				"{query} should be rejected"
			);
		}
	}
}
