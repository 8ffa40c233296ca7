use anyhow::Result;
use indoc::indoc;
use rillfind::{
    Args, Arity, Error, Finders, Inheritance, Model, OptionSet, PgBackend, SingleTableInheritance,
};
use serde::Deserialize;
use serde_json::json;
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};

#[derive(Debug, Deserialize, PartialEq)]
struct Recipe {
    id: i32,
    author: String,
    private: bool,
}

impl Model for Recipe {
    fn table_name() -> &'static str {
        "recipes"
    }
}

#[derive(Debug, Deserialize)]
struct Admin {
    name: String,
}

impl Model for Admin {
    fn table_name() -> &'static str {
        "accounts"
    }

    fn inheritance() -> Option<Box<dyn Inheritance>> {
        Some(Box::new(SingleTableInheritance::subtype("kind", ["Admin"])))
    }
}

async fn start_postgres() -> Result<(ContainerAsync<GenericImage>, PgBackend)> {
    let image = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_USER", "postgres")
        .with_env_var("POSTGRES_PASSWORD", "postgres");

    let container = image.start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgres://postgres:postgres@{host}:{port}/postgres?sslmode=disable");

    let backend = PgBackend::builder(url).max_connections(4).build().await?;

    for ddl in [
        indoc! {"
            create table recipes (
                id int primary key,
                author text not null,
                private boolean not null default false
            )
        "},
        "insert into recipes values (1, 'martin', false), (2, 'martin', true), (3, 'o''hara', false)",
        "create table accounts (id int primary key, name text not null, kind text not null)",
        "insert into accounts values (1, 'ann', 'User'), (2, 'bob', 'Admin')",
        "create table authors (id int primary key, name text not null)",
        "insert into authors values (10, 'martin'), (20, 'o''hara')",
    ] {
        sqlx::query(ddl).execute(backend.pool()).await?;
    }

    Ok((container, backend))
}

#[tokio::test]
async fn finders_against_postgres() -> Result<()> {
    let (_container, backend) = start_postgres().await?;

    let mut recipes = Finders::<Recipe>::new(backend.clone());
    recipes.define(
        "find_all_of_author",
        Arity::Many,
        OptionSet::new()
            .conditions("author = :author AND private = :private")
            .order("id"),
    )?;
    recipes.define(
        "find_by_id",
        Arity::Single,
        OptionSet::new().conditions("id = :id").positional(true),
    )?;
    recipes.define(
        "page",
        Arity::Many,
        OptionSet::new().order("id").limit(":n").offset(":skip"),
    )?;

    let public = recipes
        .all(
            "find_all_of_author",
            Args::named(json!({"author": "martin", "private": false})),
        )
        .await?;
    assert_eq!(
        public,
        vec![Recipe {
            id: 1,
            author: "martin".into(),
            private: false
        }]
    );

    let quoted = recipes
        .all(
            "find_all_of_author",
            Args::named(json!({"author": "o'hara", "private": false})),
        )
        .await?;
    assert_eq!(quoted.len(), 1);

    assert!(recipes.first("find_by_id", Args::positional([99])).await?.is_none());
    let found = recipes.first("find_by_id", Args::positional([2])).await?;
    assert!(found.is_some_and(|r| r.private));

    let page = recipes
        .all("page", Args::named(json!({"n": 2, "skip": 1})))
        .await?;
    assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), [2, 3]);

    Ok(())
}

#[tokio::test]
async fn subtype_and_database_errors() -> Result<()> {
    let (_container, backend) = start_postgres().await?;

    let mut admins = Finders::<Admin>::new(backend.clone());
    admins.define("everyone", Arity::Many, OptionSet::new().order("id"))?;
    let found = admins.all("everyone", Args::none()).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "bob");

    admins.define("broken", Arity::Many, OptionSet::new().conditions("no_such_column = 1"))?;
    let err = admins.all("broken", Args::none()).await.unwrap_err();
    assert!(matches!(err, Error::Db(_)));

    Ok(())
}

#[derive(Debug, Deserialize, PartialEq)]
struct AuthoredRecipe {
    id: i32,
    author_id: i32,
    private: bool,
}

impl Model for AuthoredRecipe {
    fn table_name() -> &'static str {
        "recipes"
    }
}

#[tokio::test]
async fn joined_columns_keep_order_and_reject_duplicates() -> Result<()> {
    let (_container, backend) = start_postgres().await?;

    let mut recipes = Finders::<AuthoredRecipe>::new(backend.clone());
    let join = "JOIN authors a ON a.name = recipes.author";
    recipes.define(
        "with_author_newest_first",
        Arity::Many,
        OptionSet::new()
            .select("recipes.id, recipes.private, a.id AS author_id")
            .joins(join)
            .order("recipes.id DESC"),
    )?;
    recipes.define(
        "everything_joined",
        Arity::Many,
        OptionSet::new().joins(join).order("recipes.id"),
    )?;

    let found = recipes.all("with_author_newest_first", Args::none()).await?;
    assert_eq!(
        found,
        vec![
            AuthoredRecipe { id: 3, author_id: 20, private: false },
            AuthoredRecipe { id: 2, author_id: 10, private: true },
            AuthoredRecipe { id: 1, author_id: 10, private: false },
        ]
    );

    // `*` over the join yields recipes.id and authors.id under one name
    let err = recipes
        .all("everything_joined", Args::none())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Backend(ref msg) if msg.contains("`id`")));

    Ok(())
}
