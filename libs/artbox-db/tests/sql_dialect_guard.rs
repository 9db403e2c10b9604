use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out);
        } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

fn line_number(content: &str, byte_idx: usize) -> usize {
    content[..byte_idx].bytes().filter(|b| *b == b'\n').count() + 1
}

fn parse_sql_literal_from_call(content: &str, call_idx: usize) -> Option<(usize, String)> {
    let open_paren_rel = content[call_idx..].find('(')?;
    let mut i = call_idx + open_paren_rel + 1;
    let bytes = content.as_bytes();

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }

    // Raw string: r"..." or r#"..."# etc.
    if bytes[i] == b'r' {
        let mut j = i + 1;
        let mut hashes = 0usize;
        while j < bytes.len() && bytes[j] == b'#' {
            hashes += 1;
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'"' {
            return None;
        }
        let start = j + 1;
        let mut end_marker = String::from("\"");
        end_marker.push_str(&"#".repeat(hashes));
        let end_rel = content[start..].find(&end_marker)?;
        let end = start + end_rel;
        return Some((i, content[start..end].to_string()));
    }

    // Standard string: "..."
    if bytes[i] == b'"' {
        let start = i + 1;
        let mut j = start;
        let mut escaped = false;
        while j < bytes.len() {
            let b = bytes[j];
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                return Some((i, content[start..j].to_string()));
            }
            j += 1;
        }
    }

    None
}

fn extract_sql_literals(content: &str) -> Vec<(usize, String)> {
    let mut result = Vec::new();
    let mut pos = 0usize;
    while let Some(rel) = content[pos..].find("sqlx::query") {
        let idx = pos + rel;
        if let Some(parsed) = parse_sql_literal_from_call(content, idx) {
            result.push(parsed);
        }
        pos = idx + "sqlx::query".len();
    }
    result
}

#[test]
fn sqlx_queries_must_not_use_sqlite_placeholders() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut files = Vec::new();
    collect_rs_files(&root, &mut files);

    let mut violations = Vec::new();
    for file in files {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        for (byte_idx, sql) in extract_sql_literals(&content) {
            if sql.contains('?') {
                let line = line_number(&content, byte_idx);
                violations.push(format!(
                    "{}:{} contains '?' placeholder in sqlx query literal",
                    file.display(),
                    line
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Found SQLite placeholders in SQL literals:\n{}",
        violations.join("\n")
    );
}

#[test]
fn credit_upsert_must_not_fail_closed() {
    // Admin corrections and settlements both run through the credit upsert;
    // it must apply any signed amount unconditionally. A balance guard here
    // would make forced negative corrections bounce.
    let ledger = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src/repositories/credit_ledger.rs");
    let content = fs::read_to_string(&ledger).expect("credit_ledger.rs must exist");

    let credit_sqls: Vec<String> = extract_sql_literals(&content)
        .into_iter()
        .map(|(_, sql)| sql.to_lowercase())
        .filter(|sql| sql.contains("excluded.credits"))
        .collect();

    assert!(
        !credit_sqls.is_empty(),
        "credit must be implemented as an upsert-increment"
    );
    for sql in credit_sqls {
        assert!(
            sql.contains("on conflict"),
            "credit lost its upsert shape: {sql}"
        );
        assert!(
            !sql.contains("credits >="),
            "credit must not carry a balance guard: {sql}"
        );
    }
}

#[test]
fn settlement_claim_must_stay_conditional() {
    // The pending -> paid transition is the exactly-once token for
    // settlement. It only works while the status check and the status write
    // live in one conditional statement that reports whether it won.
    let orders = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src/repositories/order_repo.rs");
    let content = fs::read_to_string(&orders).expect("order_repo.rs must exist");

    let claim_sql = extract_sql_literals(&content)
        .into_iter()
        .map(|(_, sql)| sql.to_lowercase())
        .find(|sql| sql.contains("update orders") && sql.contains("set status"));

    let claim_sql = claim_sql.expect("the paid claim must be a SQL update on orders");
    assert!(
        claim_sql.contains("and status ="),
        "paid claim lost its status-bound WHERE condition: {claim_sql}"
    );
    assert!(
        claim_sql.contains("returning"),
        "paid claim must report whether it won atomically: {claim_sql}"
    );
}

#[test]
fn ledger_mutations_must_stay_conditional() {
    // The debit path is only safe under concurrency while the balance check
    // and the decrement live in one conditional statement. Catch anyone
    // splitting it back into read-then-write.
    let ledger = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src/repositories/credit_ledger.rs");
    let content = fs::read_to_string(&ledger).expect("credit_ledger.rs must exist");

    let debit_sql = extract_sql_literals(&content)
        .into_iter()
        .map(|(_, sql)| sql.to_lowercase())
        .find(|sql| sql.contains("credits - "));

    let debit_sql = debit_sql.expect("debit must be implemented as a SQL decrement");
    assert!(
        debit_sql.contains("credits >="),
        "debit decrement lost its balance guard: {debit_sql}"
    );
    assert!(
        debit_sql.contains("returning"),
        "debit must report the post-decrement balance atomically: {debit_sql}"
    );
}
