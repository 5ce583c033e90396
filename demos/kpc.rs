extern crate kpc;

#[cfg(target_os = "macos")]
fn main() {
	use kpc::{EventList, Kperf};

	let kperf = match Kperf::load() {
		Ok(k) => k,
		Err(e) => {
			eprintln!("kpc: {}", e);
			std::process::exit(1);
		}
	};

	let mut events = EventList::new();
	events.push("cycles", "FIXED_CYCLES").unwrap();
	events.push("instructions", "FIXED_INSTRUCTIONS").unwrap();
	events.push("branches", "INST_BRANCH").unwrap();
	events.push("branch misses", "BRANCH_MISPRED_NONSPEC").unwrap();
	events.push("subroutine calls", "INST_BRANCH_CALL").unwrap();

	let running = kpc::start(&kperf, &events).unwrap();
	profile();
	let measurement = running.finish().unwrap();

	println!("=== kpc report ===\n");
	print!("{}", measurement);
}

#[cfg(target_os = "macos")]
fn profile() {
	// do some stuff...
	let mut x: u32 = 2463534242;
	for _ in 0..100_000 {
		x ^= x << 13;
		x ^= x >> 17;
		x ^= x << 5;
		if x % 2 == 1 {
			x = x.rotate_left(3);
		}
	}
	std::hint::black_box(x);
}

#[cfg(not(target_os = "macos"))]
fn main() {
	eprintln!("kpc: the kperf backend is only available on macOS");
}
