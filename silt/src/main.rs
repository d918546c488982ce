//! Object-graph churn driver: allocates, links, drops and becomes objects
//! at random so the sampling collector gets realistic traffic, then reports
//! what survived. Teardown prints the GC timing counters.

use std::process;

use clap::{App, Arg};

use silt::{
    AllocKind, Array, HeapObject, Mutator, Random, ARRAY_CID, BYTE_ARRAY_CID, CLOSURE_CID,
    EPHEMERON_CID, STRING_CID, WEAK_ARRAY_CID,
};

/// Keep the working stack this deep at most; the rest is garbage for the
/// collector to find
const MAX_ROOTS: usize = 48;

fn main() {
    let matches = App::new("silt")
        .about("Object-graph churn driver for the silt heap")
        .arg(
            Arg::with_name("iterations")
                .short("n")
                .long("iterations")
                .takes_value(true)
                .default_value("100000")
                .help("How many mutation rounds to run"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .default_value("42")
                .help("Seed for both the driver and the collector"),
        )
        .arg(
            Arg::with_name("churn")
                .long("churn")
                .takes_value(true)
                .default_value("50")
                .help("Percent of roots dropped when the stack fills"),
        )
        .get_matches();

    let iterations = parse_flag(&matches, "iterations");
    let seed = parse_flag(&matches, "seed");
    let churn = parse_flag(&matches, "churn");
    if churn > 100 {
        eprintln!("--churn must be a percentage");
        process::exit(1);
    }

    run(iterations as usize, seed, churn as usize);
}

fn parse_flag(matches: &clap::ArgMatches, name: &str) -> u64 {
    match matches.value_of(name).unwrap().parse::<u64>() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("--{} wants a non-negative integer", name);
            process::exit(1);
        }
    }
}

fn run(iterations: usize, seed: u64, churn: usize) {
    let mut mutator = Mutator::new_with_seed(seed);
    let mut rng = Random::new(seed.wrapping_mul(0x517cc1b727220a95) | 1);
    let mut becomes = 0usize;
    let mut finalized = 0usize;

    for round in 0..iterations {
        if mutator.stack_depth() >= MAX_ROOTS {
            let drop_count = (MAX_ROOTS * churn / 100).max(1);
            for _ in 0..drop_count {
                mutator.pop_root();
            }
        }

        match rng.next_u64() % 16 {
            0..=4 => {
                let len = (rng.next_u64() % 8) as usize;
                let arr = mutator.heap().allocate_array(len, AllocKind::Normal);
                mutator.push_root(arr.object().value()).unwrap();
            }
            5..=6 => {
                let len = (rng.next_u64() % 64) as usize;
                let bytes = mutator.heap().allocate_byte_array(len, AllocKind::Normal);
                mutator.push_root(bytes.object().value()).unwrap();
            }
            7 => {
                let s = mutator.make_string(&format!("round-{}", round), AllocKind::Normal);
                mutator.push_root(s.object().value()).unwrap();
            }
            8 => {
                let closure = mutator
                    .heap()
                    .allocate_closure((rng.next_u64() % 4) as usize, AllocKind::Normal);
                mutator.push_root(closure.object().value()).unwrap();
            }
            9 => {
                let weak = mutator.heap().allocate_weak_array(1, AllocKind::Normal);
                mutator.push_root(weak.object().value()).unwrap();
            }
            10..=13 => link_random_roots(&mut mutator, &mut rng),
            14 => {
                // an ephemeron watching one of the current roots
                if mutator.stack_depth() > 0 {
                    let key = mutator.root_at((rng.next_u64() as usize) % mutator.stack_depth());
                    if key.is_heap_object() {
                        let ephemeron = mutator.heap().allocate_ephemeron(AllocKind::Normal);
                        mutator.push_root(ephemeron.object().value()).unwrap();
                        ephemeron.set_key(key);
                        let marker = mutator.make_string("mourned", AllocKind::Normal);
                        ephemeron.set_finalizer(marker.object().value());
                    }
                }
            }
            _ => {
                if round % 64 == 0 {
                    becomes += swap_two_fresh_arrays(&mut mutator, &mut rng) as usize;
                }
            }
        }

        while mutator.take_finalizer().is_some() {
            finalized += 1;
        }
    }

    let heap = mutator.heap();
    println!("rounds:          {}", iterations);
    println!("heap bytes:      {}", heap.size());
    println!("becomes:         {}", becomes);
    println!("finalized:       {}", finalized);
    println!("arrays:          {}", heap.count_instances(ARRAY_CID));
    println!("weak arrays:     {}", heap.count_instances(WEAK_ARRAY_CID));
    println!("byte arrays:     {}", heap.count_instances(BYTE_ARRAY_CID));
    println!("strings:         {}", heap.count_instances(STRING_CID));
    println!("closures:        {}", heap.count_instances(CLOSURE_CID));
    println!("ephemerons:      {}", heap.count_instances(EPHEMERON_CID));

    if mutator.stack_depth() > 0 {
        let sample = mutator.root_at(0);
        println!("sample root:     {}", silt::to_debug_string(heap, sample));
    }
}

/// Point one rooted array at another rooted value
fn link_random_roots(mutator: &mut Mutator, rng: &mut Random) {
    let depth = mutator.stack_depth();
    if depth < 2 {
        return;
    }
    let from = mutator.root_at((rng.next_u64() as usize) % depth);
    let to = mutator.root_at((rng.next_u64() as usize) % depth);

    if from.is_heap_object() {
        let obj = HeapObject::from_value(from);
        if obj.cid() == ARRAY_CID {
            let arr = Array::cast(obj);
            if arr.length() > 0 {
                arr.set_element((rng.next_u64() as usize) % arr.length(), to);
            }
        }
    }
}

/// Re-identify one fresh array as another and report whether it took
fn swap_two_fresh_arrays(mutator: &mut Mutator, rng: &mut Random) -> bool {
    let len = (rng.next_u64() % 4) as usize;
    let a = mutator.heap().allocate_array(len, AllocKind::Normal);
    if mutator.push_root(a.object().value()).is_err() {
        return false;
    }
    let b = mutator.heap().allocate_array(len, AllocKind::Normal);
    if mutator.push_root(b.object().value()).is_err() {
        mutator.pop_root();
        return false;
    }

    let old = mutator.heap().allocate_array(1, AllocKind::Normal);
    if mutator.push_root(old.object().value()).is_err() {
        mutator.pop_root();
        mutator.pop_root();
        return false;
    }
    old.set_element(0, a.object().value());
    let new = mutator.heap().allocate_array(1, AllocKind::Normal);
    if mutator.push_root(new.object().value()).is_err() {
        mutator.pop_root();
        mutator.pop_root();
        mutator.pop_root();
        return false;
    }
    new.set_element(0, b.object().value());

    let swapped = mutator.heap().become_forward(old, new);

    mutator.pop_root();
    mutator.pop_root();
    mutator.pop_root();
    mutator.pop_root();
    swapped
}
