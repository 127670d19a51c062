//! The list-shaped descriptor: dimensions and properties are ordered lists of
//! records that carry their own `name`.

use super::{
	validate::{self, Collector, ResolveOptions, ValidationError},
	EntityHeader, SchemaVariant,
};

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListDimension {
	pub name: String,
	pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListProperty {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
	pub reference: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub dims: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub unit: Option<String>,
	pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntity {
	#[serde(flatten)]
	pub header: EntityHeader,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub dimensions: Option<Vec<ListDimension>>,
	pub properties: Vec<ListProperty>,
}

impl ListEntity {
	pub(crate) fn parse(raw: &Value, options: &ResolveOptions) -> Result<Self, Vec<ValidationError>> {
		let mut c = Collector::new(SchemaVariant::List);
		let Some(obj) = c.object(raw, "") else {
			return c.finish(None);
		};

		let header = validate::header(&mut c, obj, options);

		let dimensions = match obj.get("dimensions").filter(|v| !v.is_null()) {
			None => None,
			Some(Value::Array(items)) => Some(
				items
					.iter()
					.enumerate()
					.filter_map(|(index, item)| {
						let location = format!("dimensions.{index}");
						let dim = c.object(item, &location)?;
						let name = c.req_str(dim, "name", &location);
						let description = c.req_str(dim, "description", &location);
						Some(ListDimension {
							name: name?,
							description: description?,
						})
					})
					.collect(),
			),
			Some(_) => {
				c.push("dimensions", "input should be a list");
				None
			}
		};

		let properties = match obj.get("properties").filter(|v| !v.is_null()) {
			None => {
				c.push("properties", "field required");
				None
			}
			Some(Value::Array(items)) => Some(
				items
					.iter()
					.enumerate()
					.filter_map(|(index, item)| {
						parse_property(&mut c, item, &format!("properties.{index}"))
					})
					.collect(),
			),
			Some(_) => {
				c.push("properties", "input should be a list");
				None
			}
		};

		let entity = properties.map(|properties| Self {
			header,
			dimensions,
			properties,
		});
		c.finish(entity)
	}
}

fn parse_property(c: &mut Collector, value: &Value, location: &str) -> Option<ListProperty> {
	let obj = c.object(value, location)?;
	let ref_key = if obj.contains_key("$ref") { "$ref" } else { "ref" };

	let name = c.opt_str(obj, "name", location);
	let kind = c.req_str(obj, "type", location);
	let reference = c.opt_http_url(obj, ref_key, location);
	let dims = c.opt_str_list(obj, "dims", location);
	let unit = c.opt_str(obj, "unit", location);
	let description = c.req_str(obj, "description", location);

	Some(ListProperty {
		name,
		kind: kind?,
		reference,
		dims,
		unit,
		description: description?,
	})
}
