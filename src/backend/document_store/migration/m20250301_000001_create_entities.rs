//! Create the entities table. The uniqueness index is managed by the backend
//! itself since its key set depends on the configured addressing scheme.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Entities::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Entities::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Entities::Identity).text())
					.col(ColumnDef::new(Entities::Namespace).text())
					.col(ColumnDef::new(Entities::Version).text())
					.col(ColumnDef::new(Entities::Name).text())
					.col(ColumnDef::new(Entities::Document).json().not_null())
					.to_owned(),
			)
			.await
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(Entities::Table).to_owned())
			.await
	}
}

#[derive(DeriveIden)]
enum Entities {
	Table,
	Id,
	Identity,
	Namespace,
	Version,
	Name,
	Document,
}
