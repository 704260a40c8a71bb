use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use log::info;

use objmap::{Link, Mixed, Model, Store};

#[derive(Debug)]
struct Address {
    street: String,
    city: String,
}

objmap::object_schema!(Address (Embedded) {
    street: String,
    city: String,
});

#[derive(Debug)]
struct Dog {
    name: String,
    age: i64,
}

objmap::object_schema!(Dog (TopLevel) {
    name: String [primary_key],
    age: i64,
});

#[derive(Debug)]
struct Person {
    id: String,
    name: String,
    age: i64,
    email: Option<String>,
    tags: Vec<String>,
    details: Mixed,
    address: Link<Address>,
    dog: Link<Dog>,
}

objmap::object_schema!(Person (TopLevel) {
    id: String [primary_key],
    name: String,
    age: i64,
    email: Option<String>,
    tags: Vec<String>,
    details: Mixed,
    address: Link<Address>,
    dog: Link<Dog>,
});

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the table descriptors of the demo models.
    Schema,
    /// Run a scripted session: insert, observe, mutate, delete.
    Demo,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Schema => schema(),
        Command::Demo => demo()?,
    }

    Ok(())
}

fn schema() {
    println!("{:#?}", Address::schema().table_spec());
    println!("{:#?}", Dog::schema().table_spec());
    println!("{:#?}", Person::schema().table_spec());
}

fn demo() -> anyhow::Result<()> {
    let store = Store::open(vec![
        Address::schema().table_spec(),
        Dog::schema().table_spec(),
        Person::schema().table_spec(),
    ])?;

    let mut details = BTreeMap::new();
    details.insert("nickname".to_owned(), Mixed::from("Freddie"));
    details.insert(
        "lucky_numbers".to_owned(),
        Mixed::List(vec![Mixed::Int(4), Mixed::Int(11)]),
    );

    let person = store.write(|txn| {
        txn.add(&Person {
            id: objmap::Uuid::new_v4().to_string(),
            name: "Fred".into(),
            age: 30,
            email: None,
            tags: vec!["staff".into()],
            details: Mixed::Dictionary(details),
            address: Link::new(Address {
                street: "1 Main St".into(),
                city: "Springfield".into(),
            }),
            dog: Link::new(Dog {
                name: "Rex".into(),
                age: 4,
            }),
        })
    })?;
    info!("inserted {person:?}");

    let deliveries = Rc::new(RefCell::new(0u32));
    let count = Rc::clone(&deliveries);
    let token = person.observe(move |change| {
        *count.borrow_mut() += 1;
        if change.is_deleted {
            println!("observed: object deleted");
            return;
        }
        for property in &change.property_changes {
            println!(
                "observed: {} changed from {:?} to {:?}",
                property.name, property.old_value, property.new_value
            );
        }
    })?;

    store.write(|_| {
        person.set("email", &Some("fred@example.com".to_owned()))?;
        person.incr("age", 1)
    })?;

    store.write(|_| person.set("tags", &vec!["staff".to_owned(), "oncall".to_owned()]))?;

    let dog: Link<Dog> = person.get("dog")?;
    if let Some(link) = dog.object_link() {
        let rex = store.get_value(link, Dog::schema().column_key("name")?)?;
        println!("linked dog: {rex:?}");
    }

    println!("detached copy: {:#?}", person.detach()?);

    store.write(|txn| txn.remove(&person))?;
    println!("valid after delete: {}", person.is_valid());

    token.unregister();
    println!("deliveries: {}", deliveries.borrow());

    Ok(())
}
