use clap::Parser;
use mapi::HashTable;
use mapi::hash_table::Entry;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    #[arg(short = 'n', long = "churn_rounds", default_value_t = 100_000)]
    churn_rounds: usize,

    #[arg(short = 's', long = "seed", default_value_t = 0x6d61_7069)]
    seed: u64,
}

fn main() {
    let args = Args::parse();
    let mut rng = SmallRng::seed_from_u64(args.seed);

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<(u32, u64)> = HashTable::with_capacity(u32::MAX, args.target_capacity);

    println!("Actual capacity: {}", table.capacity());
    println!("Bucket count: {}", table.bucket_count());
    println!("Filling table with random keys...");

    let num_values = table.capacity();
    let mut keys = Vec::with_capacity(num_values);
    let mut duplicates = 0;
    while keys.len() < num_values {
        let key = rng.random_range(0..u32::MAX);
        match table.try_entry(key) {
            Ok(Entry::Vacant(entry)) => {
                entry.insert((key, keys.len() as u64));
                keys.push(key);
            }
            Ok(Entry::Occupied(_)) => duplicates += 1,
            Err(e) => {
                eprintln!("Growth failed: {e}");
                return;
            }
        }
    }

    println!("Inserted {} values into table", table.len());
    println!("Random key collisions skipped: {duplicates}");
    println!(
        "Final load factor: {:.2}%",
        (table.len() as f64 / table.bucket_count() as f64) * 100.0
    );

    table.probe_histogram().print();
    table.debug_stats().print();

    if keys.is_empty() {
        println!("Nothing to churn in an empty table");
        return;
    }

    println!("Churning {} erase/insert rounds...", args.churn_rounds);
    for _ in 0..args.churn_rounds {
        let victim = rng.random_range(0..keys.len());
        table.erase(keys[victim]);

        let key = loop {
            let key = rng.random_range(0..u32::MAX);
            if !table.contains_key(key) {
                break key;
            }
        };
        if table.insert((key, victim as u64)).is_ok() {
            keys[victim] = key;
        }
    }

    println!("Bucket count after churn: {}", table.bucket_count());
    table.probe_histogram().print();
    table.debug_stats().print();
}
