use throttle::Snapshot;

/// Erase the current terminal line and move to its start.
pub const LINE_RESET: &str = "\r\x1b[K";

const BAR_FILL: char = '*';

/// `YYYY/MM/DD hh:mm:ss.mmm ZONE`
pub fn format_timestamp<Tz>(timestamp: &chrono::DateTime<Tz>, zone: &str) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{} {}", timestamp.format("%Y/%m/%d %H:%M:%S%.3f"), zone)
}

/// Abbreviation of the local zone in effect at `timestamp`, e.g. `JST` or `CEST`.
///
/// chrono only knows the numeric offset of `Local`, the name comes from the C library.
pub fn local_zone_name(timestamp: &chrono::DateTime<chrono::Local>) -> Option<String> {
    let secs = timestamp.timestamp() as libc::time_t;
    // SAFETY: an all-zero tm is a valid value for localtime_r to overwrite
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    // SAFETY: both pointers are valid for the duration of the call
    let res = unsafe { libc::localtime_r(&secs, &mut tm) };
    if res.is_null() || tm.tm_zone.is_null() {
        return None;
    }
    // SAFETY: tm_zone points at a NUL terminated name owned by the C library's zone data
    let name = unsafe { std::ffi::CStr::from_ptr(tm.tm_zone) };
    match name.to_str() {
        Ok(name) if !name.is_empty() => Some(name.to_string()),
        _ => None,
    }
}

/// Current local time, with the numeric offset standing in when no zone name is known.
pub fn local_timestamp() -> String {
    let now = chrono::Local::now();
    let zone = match local_zone_name(&now) {
        Some(zone) => zone,
        None => now.format("%:z").to_string(),
    };
    format_timestamp(&now, &zone)
}

/// `(NNN%)` when the total is known, empty otherwise.
fn percent(snapshot: &Snapshot) -> String {
    if snapshot.total_size == 0 {
        return String::new();
    }
    let pct = u128::from(snapshot.transferred) * 100 / u128::from(snapshot.total_size);
    format!("({pct:>3}%)")
}

/// Number of bar cells to fill, never more than `width`.
pub fn filled_cells(transferred: u64, total_size: u64, width: usize) -> usize {
    if total_size == 0 {
        return 0;
    }
    let filled = u128::from(transferred) * width as u128 / u128::from(total_size);
    usize::try_from(filled).unwrap_or(usize::MAX).min(width)
}

/// `[****      ]`, always `width` cells between the brackets.
pub fn render_bar(transferred: u64, total_size: u64, width: usize) -> String {
    let filled = filled_cells(transferred, total_size, width);
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.extend(std::iter::repeat_n(BAR_FILL, filled));
    bar.extend(std::iter::repeat_n(' ', width - filled));
    bar.push(']');
    bar
}

/// Single progress line, overwriting whatever the terminal line held before.
pub fn render_standard(snapshot: &Snapshot, timestamp: &str) -> String {
    let (speed, prefix) = crate::prefix::in_binary_prefix(snapshot.speed);
    format!(
        "{LINE_RESET}[{}]\t{}Bytes{}\t@ {:.1}{}Bps",
        timestamp,
        snapshot.transferred,
        percent(snapshot),
        speed,
        prefix
    )
}

/// The standard line followed by a bar `width` cells wide.
pub fn render_graph(snapshot: &Snapshot, timestamp: &str, width: usize) -> String {
    format!(
        "{}\t{}",
        render_standard(snapshot, timestamp),
        render_bar(snapshot.transferred, snapshot.total_size, width)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const STAMP: &str = "2024/03/05 07:08:09.010 UTC";

    #[test]
    fn timestamp_layout() {
        let timestamp = chrono::Utc
            .with_ymd_and_hms(2024, 3, 5, 7, 8, 9)
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::milliseconds(10))
            .unwrap();
        assert_eq!(format_timestamp(&timestamp, "UTC"), STAMP);
    }

    #[test]
    fn local_timestamp_names_the_zone() {
        let now = chrono::Local::now();
        let zone = local_zone_name(&now).expect("C library knows the local zone");
        assert!(!zone.is_empty());
        assert!(
            !zone.contains(':'),
            "numeric offset instead of a name: {zone}"
        );
        let line = local_timestamp();
        let field = line.rsplit(' ').next().unwrap();
        assert!(!field.contains(':'), "zone field is an offset: {line}");
        assert!(
            field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-'),
            "unexpected zone field: {line}"
        );
    }

    #[test]
    fn utc_zone_is_named() {
        if std::env::var("TZ").is_ok_and(|tz| tz == "UTC") {
            let line = local_timestamp();
            assert!(line.ends_with(" UTC"), "{line}");
        }
    }

    #[test]
    fn standard_with_known_size() {
        let snapshot = Snapshot {
            transferred: 512,
            total_size: 2048,
            speed: 1536,
        };
        assert_eq!(
            render_standard(&snapshot, STAMP),
            "\r\x1b[K[2024/03/05 07:08:09.010 UTC]\t512Bytes( 25%)\t@ 1.5KBps"
        );
    }

    #[test]
    fn standard_with_unknown_size() {
        let snapshot = Snapshot {
            transferred: 100,
            total_size: 0,
            speed: 0,
        };
        assert_eq!(
            render_standard(&snapshot, STAMP),
            "\r\x1b[K[2024/03/05 07:08:09.010 UTC]\t100Bytes\t@ 0.0Bps"
        );
    }

    #[test]
    fn percent_truncates() {
        let snapshot = Snapshot {
            transferred: 2,
            total_size: 3,
            speed: 0,
        };
        assert_eq!(percent(&snapshot), "( 66%)");
        let done = Snapshot {
            transferred: 3,
            total_size: 3,
            speed: 0,
        };
        assert_eq!(percent(&done), "(100%)");
    }

    #[test]
    fn graph_appends_bar() {
        let snapshot = Snapshot {
            transferred: 50,
            total_size: 100,
            speed: 0,
        };
        let line = render_graph(&snapshot, STAMP, 10);
        assert!(line.starts_with(&render_standard(&snapshot, STAMP)));
        assert!(line.ends_with("\t[*****     ]"));
    }

    #[test]
    fn bar_edges() {
        assert_eq!(render_bar(0, 100, 4), "[    ]");
        assert_eq!(render_bar(100, 100, 4), "[****]");
        assert_eq!(render_bar(10, 0, 4), "[    ]");
        assert_eq!(render_bar(500, 100, 4), "[****]");
        assert_eq!(render_bar(1, 1, 0), "[]");
    }

    proptest! {
        #[test]
        fn bar_never_overflows(total in 1u64.., fraction in 0.0f64..=1.0, width in 0usize..500) {
            let transferred = (total as f64 * fraction) as u64;
            let filled = filled_cells(transferred, total, width);
            prop_assert!(filled <= width);
            let bar = render_bar(transferred, total, width);
            prop_assert_eq!(bar.chars().count(), width + 2);
        }
    }
}
