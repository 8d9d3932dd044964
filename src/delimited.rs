//! Quote-aware delimited text primitives.
//!
//! Shared by the CSV/TSV heuristic (field counting on sampled lines) and the
//! tabular stager (full record parsing). Quoting follows RFC 4180: a field
//! wrapped in `"` may contain delimiters, newlines, and doubled `""` quotes.

/// Candidate delimiters for sniffing, in preference order.
pub const SNIFF_DELIMITERS: &[char] = &[',', '\t', ';', '|'];

/// Counts fields on a single line, ignoring delimiters inside quotes.
pub fn count_fields(line: &str, delim: char) -> usize {
    let mut fields = 1;
    let mut in_quotes = false;
    for ch in line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == delim && !in_quotes {
            fields += 1;
        }
    }
    fields
}

/// Parses delimited text into records. Blank lines are skipped.
pub fn parse_records(text: &str, delim: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => in_quotes = true,
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut record));
            }
            c if c == delim => record.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        push_record(&mut records, record);
    }
    records
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.iter().all(|f| f.trim().is_empty());
    if !blank {
        records.push(record);
    }
}

/// Picks the delimiter whose per-line field count is most stable over the
/// first lines, the way a dialect sniffer would. Falls back to comma vs tab
/// by raw occurrence count.
pub fn sniff_delimiter(text: &str) -> char {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();

    let mut best: Option<(char, usize)> = None;
    for &delim in SNIFF_DELIMITERS {
        let counts: Vec<usize> = sample.iter().map(|l| count_fields(l, delim)).collect();
        let Some(&first) = counts.first() else {
            continue;
        };
        if first > 1 && counts.iter().all(|&c| c == first) {
            match best {
                Some((_, cols)) if cols >= first => {}
                _ => best = Some((delim, first)),
            }
        }
    }
    if let Some((delim, _)) = best {
        return delim;
    }

    let head: String = sample.join("\n");
    if head.matches(',').count() >= head.matches('\t').count() {
        ','
    } else {
        '\t'
    }
}
