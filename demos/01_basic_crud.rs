//! Demo 01: Basic CRUD Operations
//!
//! Creates, reads, updates, lists and deletes action items.
//!
//! Run with: cargo run --example 01_basic_crud

use chrono::{TimeDelta, Utc};
use eyre::Result;
use timesup::{ItemFilter, Store};

fn main() -> Result<()> {
    // Create a temporary directory for this demo
    let temp_dir = tempfile::tempdir()?;
    let store_path = temp_dir.path().to_path_buf();

    println!("TimesUp Basic CRUD Demo");
    println!("=======================\n");
    println!("Store path: {}\n", store_path.display());

    let mut store = Store::open(&store_path)?;

    // CREATE
    println!("1. CREATE - Adding three items out of order...");
    let now = Utc::now();
    let jd = store.create("JD | Moutai", "https://www.jd.com", now + TimeDelta::hours(2))?;
    let tmall = store.create("Tmall | Moutai", "https://www.tmall.com", now - TimeDelta::hours(1))?;
    let suning = store.create("Suning | Moutai", "https://www.suning.com", now + TimeDelta::minutes(15))?;
    println!("   Created {}, {}, {}\n", jd, tmall, suning);

    // READ
    println!("2. READ - Retrieving one item...");
    if let Some(item) = store.get(&jd)? {
        println!("   - Title: {}", item.main_title);
        println!("   - Link: {}", item.link);
        println!("   - Due: {}", item.due_date);
        println!("   - Status: {}", item.status());
    }
    println!();

    // UPDATE
    println!("3. UPDATE - Moving the JD item into the past...");
    store.update(&jd, "JD | iPhone 15", "https://www.jd.com", now - TimeDelta::hours(3))?;
    println!();

    // LIST
    for filter in ItemFilter::ALL {
        println!("4. LIST ({}) - earliest due first:", filter);
        for item in store.list_at(filter, now)? {
            println!("   - [{:<7}] {} : {}", item.status_at(now), item.due_date, item.main_title);
        }
        println!();
    }

    // DELETE
    println!("5. DELETE - Removing two items plus one unknown id...");
    let removed = store.delete([jd.as_str(), tmall.as_str(), "not-a-real-id"])?;
    println!("   Removed {} item(s); {} left\n", removed.len(), store.count(ItemFilter::All)?);

    println!("Demo complete!");
    Ok(())
}
