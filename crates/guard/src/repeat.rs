//! Detection of long consecutively repeated substrings.
//!
//! A text is flagged when some unit of at least `min_length` characters
//! occurs `min_repeats` times back to back. For each candidate period `p`
//! the text repeats with period `p` over a window exactly when
//! `chars[i] == chars[i + p]` holds for a run of `p * (min_repeats - 1)`
//! positions, so each period is checked in one linear pass.

use bastion_core::config::RepeatPolicy;

/// Whether `text` contains a unit of at least `policy.min_length` characters
/// repeated at least `policy.min_repeats` times in a row.
pub fn has_repeated_pattern(text: &str, policy: &RepeatPolicy) -> bool {
    let min_length = policy.min_length.max(1);
    let min_repeats = policy.min_repeats.max(2);

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n < min_length * min_repeats {
        return false;
    }

    let max_period = n / min_repeats;
    for period in min_length..=max_period {
        let needed = period * (min_repeats - 1);
        let mut run = 0usize;

        for i in 0..n - period {
            if chars[i] == chars[i + period] {
                run += 1;
                if run >= needed {
                    return true;
                }
            } else {
                run = 0;
            }
        }
    }

    false
}
