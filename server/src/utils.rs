use rand::Rng;

pub const MIN_NAME_LEN: usize = 4;
pub const MAX_NAME_LEN: usize = 16;

// Guest names look like "guest_01234"; uniqueness is the caller's job
pub fn generate_guest_name() -> String {
    let number: u32 = rand::thread_rng().gen_range(0..100_000);
    format!("guest_{:05}", number)
}

// Length is counted in characters, not bytes
pub fn is_valid_name(name: &str) -> bool {
    let len = name.chars().count();
    (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len)
}
