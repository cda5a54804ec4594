//! Human-readable random names for temporary onboarding resources,
//! e.g. `teal-polar-bear-4821`.

use rand::Rng;
use rand::seq::SliceRandom;

/// Prefix marking roles created for onboarding. Bulk reset keys on it.
pub const TEMP_ROLE_PREFIX: &str = "o-";

const COLORS: &[&str] = &[
    "Red", "Orange", "Yellow", "Green", "Blue", "Cyan", "Purple", "White", "Black", "Brown",
    "Magenta", "Tan", "Olive", "Maroon", "Navy", "Aquamarine", "Turquoise", "Silver", "Lime",
    "Teal", "Indigo", "Violet", "Pink", "Gray",
];

const BEARS: &[&str] = &[
    "black bear",
    "brown bear",
    "bruin",
    "grizzly",
    "kermode",
    "Kodiak",
    "lip bear",
    "panda",
    "polar bear",
    "sloth",
    "sun bear",
    "bear",
    "ursid",
];

/// Draw a name: `{color}-{bear}-{1000..=9999}`, lowercase, dash-separated.
pub fn random_name() -> String {
    random_name_with(&mut rand::thread_rng())
}

/// [`random_name`] with an explicit RNG.
pub fn random_name_with<R: Rng>(rng: &mut R) -> String {
    let color = COLORS.choose(rng).copied().unwrap_or("gray");
    let bear = BEARS.choose(rng).copied().unwrap_or("bear");
    let number: u16 = rng.gen_range(1000..=9999);
    format!("{color}-{}-{number}", bear.replace(' ', "-")).to_lowercase()
}

/// Role name for a temporary workspace name.
pub fn temp_role_name(name: &str) -> String {
    format!("{TEMP_ROLE_PREFIX}{name}")
}

/// Whether a role name was produced by [`temp_role_name`].
pub fn is_temp_role(name: &str) -> bool {
    name.starts_with(TEMP_ROLE_PREFIX)
}
