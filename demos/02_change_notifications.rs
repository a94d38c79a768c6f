//! Demo 02: Change Notifications
//!
//! A view-model shares the store's notifier and re-derives its projection on
//! every change, the way a list screen refreshes.
//!
//! Run with: cargo run --example 02_change_notifications

use chrono::{TimeDelta, Utc};
use eyre::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use timesup::{ChangeEvent, ChangeNotifier, Countdown, ItemFilter, Store};

fn main() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;

    println!("TimesUp Change Notification Demo");
    println!("================================\n");

    // The notifier is owned here and handed to the store
    let notifier = ChangeNotifier::new();

    let refreshes = Arc::new(AtomicU64::new(0));
    let counter = refreshes.clone();
    let list_view = notifier.subscribe(move |event| {
        counter.fetch_add(1, Ordering::SeqCst);
        match event {
            ChangeEvent::Created { id } => println!("   [list view] created {}", id),
            ChangeEvent::Updated { id } => println!("   [list view] updated {}", id),
            ChangeEvent::Deleted { ids } => println!("   [list view] deleted {} item(s)", ids.len()),
        }
    });

    // An observer that fails must not stop the others
    let _faulty = notifier.subscribe(|_| panic!("faulty observer"));

    let mut store = Store::open_with_notifier(temp_dir.path(), notifier.clone())?;

    println!("1. Adding items...");
    let now = Utc::now();
    let a = store.create("Pinduoduo | Xiaomi 14 Ultra", "", now + TimeDelta::minutes(30))?;
    let b = store.create("JD | Lenovo laptop", "", now + TimeDelta::days(2))?;
    println!();

    println!("2. Editing one item...");
    store.update(&b, "JD | vivo X Fold 3 Pro", "", now + TimeDelta::days(1))?;
    println!();

    if let Some(next) = store.next_ongoing(now)? {
        if let Some(countdown) = Countdown::until(&next, now) {
            println!("   Next up: {} in {}\n", countdown.title, countdown);
        }
    }

    println!("3. Dropping the list view, then deleting...");
    drop(list_view);
    store.delete([a.as_str(), b.as_str()])?;
    println!();

    println!(
        "List view refreshed {} time(s); notifier revision {}; {} item(s) left",
        refreshes.load(Ordering::SeqCst),
        notifier.revision(),
        store.count(ItemFilter::All)?
    );

    println!("\nDemo complete!");
    Ok(())
}
