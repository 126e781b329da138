// connexion BD + création du schéma SQLite

use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema};

use crate::models::{leads, otp_verifications, report_data, task_documents, tasks, user_tasks, users};

pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);

    // Une base SQLite en mémoire n'existe que pour sa connexion
    if database_url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }

    let db = Database::connect(options).await?;
    sync_schema(&db).await?;
    Ok(db)
}

/// Crée les tables manquantes depuis les entités (ordre des clés étrangères)
pub async fn sync_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, users::Entity).await?;
    create_table(db, &schema, tasks::Entity).await?;
    create_table(db, &schema, user_tasks::Entity).await?;
    create_table(db, &schema, leads::Entity).await?;
    create_table(db, &schema, otp_verifications::Entity).await?;
    create_table(db, &schema, task_documents::Entity).await?;
    create_table(db, &schema, report_data::Entity).await?;

    for mut index in schema.create_index_from_entity(otp_verifications::Entity) {
        index.if_not_exists();
        db.execute(db.get_database_backend().build(&index)).await?;
    }

    Ok(())
}

async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    let mut statement: TableCreateStatement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(db.get_database_backend().build(&statement)).await?;
    Ok(())
}
