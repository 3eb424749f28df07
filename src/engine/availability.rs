use crate::model::*;

// ── Free-window computation ──────────────────────────────────────

/// Maximal sub-ranges of `window` not covered by a non-cancelled booking.
/// A room under maintenance has none.
pub fn free_windows(rs: &RoomState, window: &StayRange) -> Vec<StayRange> {
    if rs.room.status == RoomStatus::Maintenance {
        return Vec::new();
    }

    let mut taken: Vec<StayRange> = rs
        .blocking(window)
        .map(|b| {
            StayRange::new(
                b.stay.check_in.max(window.check_in),
                b.stay.check_out.min(window.check_out),
            )
        })
        .collect();
    taken.sort_by_key(|s| s.check_in);
    let taken = merge_overlapping(&taken);

    subtract_ranges(&[*window], &taken)
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_overlapping(sorted: &[StayRange]) -> Vec<StayRange> {
    let mut merged: Vec<StayRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.check_in <= last.check_out
        {
            last.check_out = last.check_out.max(range.check_out);
            continue;
        }
        merged.push(range);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted by check-in and disjoint.
pub fn subtract_ranges(base: &[StayRange], to_remove: &[StayRange]) -> Vec<StayRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.check_in;

        while ri < to_remove.len() && to_remove[ri].check_out <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].check_in < b.check_out {
            let r = &to_remove[j];
            if r.check_in > cursor {
                result.push(StayRange::new(cursor, r.check_in));
            }
            cursor = cursor.max(r.check_out);
            j += 1;
        }

        if cursor < b.check_out {
            result.push(StayRange::new(cursor, b.check_out));
        }
    }

    result
}
