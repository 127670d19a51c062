//! Stored entity descriptor

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "entities")]
pub struct Model {
	/// Row key, never handed out
	#[sea_orm(primary_key)]
	pub id: i32,
	pub identity: Option<String>,
	pub namespace: Option<String>,
	pub version: Option<String>,
	pub name: Option<String>,
	/// The descriptor in its stored form
	pub document: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
