//! Every strategy must produce the same table from the same input.

mod common;

use common::*;
use docarrow::source::memory::write_dump;
use docarrow::{SourceSpec, Strategy};
use mongodb::bson::{Document, doc};

const SCHEMA: &str = "id:int64, vec_int:list<int64>, label:string";

#[tokio::test]
async fn test_strategies_agree() {
    let source = SourceSpec::inline(records(500));
    let predicate = doc! { "id": { "$gte": 100 } };

    let baseline = export_with(&source, predicate.clone(), schema(SCHEMA), Strategy::Sequential, 1)
        .await
        .unwrap();
    assert_eq!(baseline.num_rows(), 400);

    for strategy in [Strategy::Multithreaded, Strategy::Multiprocess] {
        for worker_count in [1, 3, 4] {
            let table = export_with(&source, predicate.clone(), schema(SCHEMA), strategy, worker_count)
                .await
                .unwrap();
            baseline.verify_equivalent(&table).unwrap();
            // partition order reproduces the sequential order exactly
            assert_eq!(table, baseline, "{strategy} with {worker_count} workers");
        }
    }
}

#[tokio::test]
async fn test_export_is_idempotent() {
    let source = SourceSpec::inline(records(97));
    for strategy in ALL_STRATEGIES {
        let first = export_with(&source, doc! {}, schema(SCHEMA), strategy, 4)
            .await
            .unwrap();
        let second = export_with(&source, doc! {}, schema(SCHEMA), strategy, 4)
            .await
            .unwrap();
        assert_eq!(first, second, "{strategy}");
    }
}

#[tokio::test]
async fn test_empty_match_keeps_schema() {
    let source = SourceSpec::inline(records(20));
    let predicate = doc! { "id": { "$lt": 0 } };

    for strategy in ALL_STRATEGIES {
        let table = export_with(&source, predicate.clone(), schema(SCHEMA), strategy, 3)
            .await
            .unwrap();
        assert!(table.is_empty(), "{strategy}");
        assert_eq!(table.num_columns(), 3);
        assert_eq!(**table.schema(), *schema(SCHEMA));
    }
}

#[tokio::test]
async fn test_more_workers_than_records() {
    let source = SourceSpec::inline(records(3));
    for strategy in ALL_STRATEGIES {
        let table = export_with(&source, doc! {}, schema(SCHEMA), strategy, 8)
            .await
            .unwrap();
        assert_eq!(ids(&table), vec![0, 1, 2], "{strategy}");
    }
}

#[tokio::test]
async fn test_type_mismatch_aborts_export() {
    let mut documents = records(40);
    documents[27].insert("id", "twenty-seven");
    let source = SourceSpec::inline(documents);

    for strategy in ALL_STRATEGIES {
        let err = export_with(&source, doc! {}, schema(SCHEMA), strategy, 4)
            .await
            .unwrap_err();
        assert!(err.is_type_mismatch(), "{strategy}: {err}");
        assert_eq!(err.partition(), Some(2), "{strategy}");
    }
}

#[tokio::test]
async fn test_large_list_export_sequential_vs_multiprocess() {
    let source = SourceSpec::inline(records(10_000));
    let spec = "id:int64, vec_int:list<int64>";

    let sequential = export_with(&source, doc! {}, schema(spec), Strategy::Sequential, 1)
        .await
        .unwrap();
    let multiprocess = export_with(&source, doc! {}, schema(spec), Strategy::Multiprocess, 4)
        .await
        .unwrap();

    assert_eq!(sequential.num_rows(), 10_000);
    sequential.verify_equivalent(&multiprocess).unwrap();
    assert_eq!(sequential.slice(0, 5), multiprocess.slice(0, 5));

    let first = multiprocess.row(0).unwrap();
    assert_eq!(first[1].as_list().unwrap().len(), 5);
    let last = multiprocess.row(9_999).unwrap();
    assert_eq!(last[0].as_i64(), Some(9_999));
}

#[tokio::test]
async fn test_matrix_shape_error() {
    let matrix = |rows: usize, short_row: Option<usize>| -> Vec<Vec<f64>> {
        (0..rows)
            .map(|r| {
                let cols = if Some(r) == short_row { 63 } else { 64 };
                vec![r as f64; cols]
            })
            .collect()
    };
    let documents: Vec<Document> = (0..6_i64)
        .map(|i| {
            let short = if i == 4 { Some(10) } else { None };
            doc! { "id": i, "m": matrix(64, short) }
        })
        .collect();
    let source = SourceSpec::inline(documents);
    let spec = "id:int64, m:matrix<float64,64,64>";

    for strategy in ALL_STRATEGIES {
        let err = export_with(&source, doc! {}, schema(spec), strategy, 2)
            .await
            .unwrap_err();
        assert!(err.is_shape(), "{strategy}: {err}");
        assert_eq!(err.partition(), Some(1), "{strategy}");
    }

    let valid = export_with(&source, doc! { "id": { "$lt": 4 } }, schema(spec), Strategy::Sequential, 2)
        .await
        .unwrap();
    assert_eq!(valid.num_rows(), 4);
}

#[tokio::test]
async fn test_dump_file_source() {
    let documents = records(50);
    let path = std::env::temp_dir().join(format!("docarrow-{}.bson", uuid::Uuid::new_v4()));
    std::fs::write(&path, write_dump(&documents).unwrap()).unwrap();
    let source = SourceSpec::DumpFile { path: path.clone() };

    let baseline = export_with(&source, doc! {}, schema(SCHEMA), Strategy::Sequential, 1)
        .await
        .unwrap();
    assert_eq!(ids(&baseline), (0..50).collect::<Vec<_>>());

    for strategy in [Strategy::Multithreaded, Strategy::Multiprocess] {
        let table = export_with(&source, doc! {}, schema(SCHEMA), strategy, 3)
            .await
            .unwrap();
        assert_eq!(table, baseline, "{strategy}");
    }

    std::fs::remove_file(&path).unwrap();
}
