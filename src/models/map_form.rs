//! The map-shaped descriptor: dimensions map a name to its description and
//! properties map a name to their definition.

use super::{
	validate::{self, Collector, ResolveOptions, ValidationError},
	EntityHeader, SchemaVariant,
};

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapProperty {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
	pub reference: Option<String>,
	/// Dimension expressions, e.g. `["K", "H+1"]`
	#[serde(skip_serializing_if = "Option::is_none")]
	pub shape: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub unit: Option<String>,
	pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntity {
	#[serde(flatten)]
	pub header: EntityHeader,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub dimensions: Option<BTreeMap<String, String>>,
	pub properties: BTreeMap<String, MapProperty>,
}

impl MapEntity {
	pub(crate) fn parse(raw: &Value, options: &ResolveOptions) -> Result<Self, Vec<ValidationError>> {
		let mut c = Collector::new(SchemaVariant::Map);
		let Some(obj) = c.object(raw, "") else {
			return c.finish(None);
		};

		let header = validate::header(&mut c, obj, options);

		let dimensions = match obj.get("dimensions").filter(|v| !v.is_null()) {
			None => None,
			Some(Value::Object(dims)) => {
				let mut out = BTreeMap::new();
				for (name, description) in dims {
					match description {
						Value::String(d) => {
							out.insert(name.clone(), d.clone());
						}
						_ => c.push(format!("dimensions.{name}"), "input should be a string"),
					}
				}
				Some(out)
			}
			Some(_) => {
				c.push("dimensions", "input should be an object");
				None
			}
		};

		let properties = match obj.get("properties").filter(|v| !v.is_null()) {
			None => {
				c.push("properties", "field required");
				None
			}
			Some(Value::Object(props)) => {
				let mut out = BTreeMap::new();
				for (name, value) in props {
					let location = format!("properties.{name}");
					if let Some(property) = parse_property(&mut c, value, &location) {
						out.insert(name.clone(), property);
					}
				}
				Some(out)
			}
			Some(_) => {
				c.push("properties", "input should be an object");
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

fn parse_property(c: &mut Collector, value: &Value, location: &str) -> Option<MapProperty> {
	let obj = c.object(value, location)?;
	let ref_key = if obj.contains_key("$ref") { "$ref" } else { "ref" };

	let name = c.opt_str(obj, "name", location);
	let kind = c.req_str(obj, "type", location);
	let reference = c.opt_http_url(obj, ref_key, location);
	let shape = c.opt_str_list(obj, "shape", location);
	let unit = c.opt_str(obj, "unit", location);
	let description = c.req_str(obj, "description", location);

	Some(MapProperty {
		name,
		kind: kind?,
		reference,
		shape,
		unit,
		description: description?,
	})
}
