//! Backup command templates
//!
//! Per-engine dump commands and the upload-plus-retention pipeline executed
//! by the backup container. Credentials are never embedded in the command
//! string; they are referenced through environment variables populated from
//! secrets (see the manifest builder).

use dbguard_common::crd::DatabaseEngine;

/// Working directory inside the backup container
pub const BACKUP_DIR: &str = "/backup";

/// Build the dump command for a database engine
///
/// Each template writes a timestamped, gzip-compressed dump into
/// [`BACKUP_DIR`]. Authentication goes through `$DB_USER` / `$DB_PASSWORD`
/// environment references, expanded inside the container, never here.
pub fn backup_command(engine: DatabaseEngine, host: &str, database: &str) -> String {
    match engine {
        DatabaseEngine::Postgres => format!(
            "pg_dump -h {host} -U $DB_USER -d {database} | gzip > \
             {BACKUP_DIR}/backup-$(date +%Y%m%d-%H%M%S).sql.gz"
        ),
        DatabaseEngine::Mysql => format!(
            "mysqldump -h {host} -u $DB_USER -p$DB_PASSWORD {database} | gzip > \
             {BACKUP_DIR}/backup-$(date +%Y%m%d-%H%M%S).sql.gz"
        ),
        DatabaseEngine::Mongodb => format!(
            "mongodump --host {host} --db {database} \
             --archive={BACKUP_DIR}/backup-$(date +%Y%m%d-%H%M%S).archive.gz --gzip"
        ),
    }
}

/// Number of newest listing entries the prune pipeline skips.
///
/// `tail -n +K` keeps lines starting at line K, so skipping the `keep_last`
/// newest entries means starting at `keep_last + 1`. Saturates at `u32::MAX`:
/// a wrap to `tail -n +0` would select the whole listing for deletion.
pub fn prune_skip_count(keep_last: u32) -> u32 {
    keep_last.saturating_add(1)
}

/// Build the upload and retention-cleanup command
///
/// Copies the local dumps to `{bucket}/{namespace}/{name}/`, lists the remote
/// prefix newest-first, skips the `keep_last` newest objects, and deletes the
/// rest. When fewer than `keep_last` objects exist the delete set is empty
/// and the pipeline is a no-op.
pub fn upload_command(bucket: &str, namespace: &str, name: &str, keep_last: u32) -> String {
    let prefix = format!("s3://{bucket}/{namespace}/{name}/");
    format!(
        "aws s3 cp {BACKUP_DIR}/*.gz {prefix} && \
         aws s3 ls {prefix} | sort -r | tail -n +{skip} | awk '{{print $4}}' | \
         xargs -I {{}} aws s3 rm {prefix}{{}}",
        skip = prune_skip_count(keep_last),
    )
}

/// Compose the full container command: dump, then upload and prune
pub fn full_command(
    engine: DatabaseEngine,
    host: &str,
    database: &str,
    bucket: &str,
    namespace: &str,
    name: &str,
    keep_last: u32,
) -> String {
    format!(
        "{} && {}",
        backup_command(engine, host, database),
        upload_command(bucket, namespace, name, keep_last)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_dump_template() {
        let cmd = backup_command(DatabaseEngine::Postgres, "db.internal", "orders");
        assert!(cmd.starts_with("pg_dump -h db.internal -U $DB_USER -d orders"));
        assert!(cmd.contains("| gzip > /backup/backup-$(date +%Y%m%d-%H%M%S).sql.gz"));
    }

    #[test]
    fn test_mysql_dump_template() {
        let cmd = backup_command(DatabaseEngine::Mysql, "mysql.svc", "shop");
        assert!(cmd.starts_with("mysqldump -h mysql.svc -u $DB_USER -p$DB_PASSWORD shop"));
        assert!(cmd.contains(".sql.gz"));
    }

    #[test]
    fn test_mongodb_dump_template() {
        let cmd = backup_command(DatabaseEngine::Mongodb, "mongo.svc", "events");
        assert!(cmd.starts_with("mongodump --host mongo.svc --db events"));
        assert!(cmd.contains("--archive=/backup/backup-$(date +%Y%m%d-%H%M%S).archive.gz"));
        assert!(cmd.ends_with("--gzip"));
    }

    #[test]
    fn test_credentials_only_via_env_references() {
        for engine in [
            DatabaseEngine::Postgres,
            DatabaseEngine::Mysql,
            DatabaseEngine::Mongodb,
        ] {
            let cmd = backup_command(engine, "h", "d");
            // secrets reach the command only as $-references, never literals
            assert!(!cmd.contains("secret"));
            assert!(!cmd.to_lowercase().contains("key"));
        }
    }

    #[test]
    fn test_upload_targets_bucket_namespace_name_prefix() {
        let cmd = upload_command("backups", "prod", "orders-db", 5);
        assert!(cmd.contains("aws s3 cp /backup/*.gz s3://backups/prod/orders-db/"));
        assert!(cmd.contains("aws s3 ls s3://backups/prod/orders-db/"));
        assert!(cmd.contains("aws s3 rm s3://backups/prod/orders-db/"));
    }

    #[test]
    fn test_prune_skips_keep_last_newest() {
        assert_eq!(prune_skip_count(5), 6);
        assert_eq!(prune_skip_count(1), 2);
        let cmd = upload_command("b", "ns", "n", 5);
        assert!(cmd.contains("sort -r | tail -n +6"));
    }

    #[test]
    fn test_prune_skip_count_saturates_at_max_retention() {
        // keep-everything retention must never wrap to a delete-everything
        // `tail -n +0`
        assert_eq!(prune_skip_count(u32::MAX), u32::MAX);
        let cmd = upload_command("b", "ns", "n", u32::MAX);
        assert!(cmd.contains(&format!("tail -n +{}", u32::MAX)));
        assert!(!cmd.contains("tail -n +0"));
    }

    /// Simulate the remote listing pipeline: `sort -r | tail -n +{skip}`
    /// over L objects must select exactly max(0, L - keep_last) victims,
    /// always the oldest ones.
    #[test]
    fn test_retention_bound_over_simulated_listing() {
        for (total, keep_last) in [(10u32, 5u32), (5, 5), (3, 5), (0, 5), (7, 1), (100, 7)] {
            let mut listing: Vec<String> = (0..total)
                .map(|i| format!("backup-2026{:04}.sql.gz", i))
                .collect();
            listing.sort_by(|a, b| b.cmp(a)); // sort -r: newest first

            let skip = prune_skip_count(keep_last) as usize;
            let victims: Vec<&String> = listing.iter().skip(skip - 1).collect();

            let expected = total.saturating_sub(keep_last) as usize;
            assert_eq!(victims.len(), expected, "L={} N={}", total, keep_last);

            // victims are exactly the oldest entries
            for victim in &victims {
                for kept in listing.iter().take(keep_last as usize) {
                    assert!(victim.as_str() < kept.as_str());
                }
            }
        }
    }

    #[test]
    fn test_full_command_chains_dump_and_upload() {
        let cmd = full_command(
            DatabaseEngine::Postgres,
            "db.internal",
            "orders",
            "backups",
            "prod",
            "orders-db",
            5,
        );
        let (dump, upload) = cmd.split_once(" && ").unwrap();
        assert!(dump.starts_with("pg_dump"));
        assert!(upload.starts_with("aws s3 cp"));
    }
}
