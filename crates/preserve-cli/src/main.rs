use std::sync::Arc;

use preserve_core::app::{JobStatus, PreservationConfig, PreservationManager};
use preserve_core::domain::{
    ContentHolder, Cpid, Dataset, DatasetLabel, FormField, FormItem, SubjectKey,
};
use preserve_core::impls::{InMemoryDatasetRepository, InMemoryRegistry};
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 2 件の埋め込み・1 件の空・1 件の外部参照フォームと、ラベル 1 件
fn demo_dataset() -> Dataset {
    Dataset::new("DS1")
        .with_form(FormItem::new(
            "readme",
            Cpid::new("ril-text"),
            ContentHolder::embedded(b"hello, archive".to_vec(), "readme.txt", "text/plain"),
        ))
        .with_form(
            FormItem::new(
                "scan",
                Cpid::new("ril-image"),
                ContentHolder::embedded(vec![0x89, b'P', b'N', b'G'], "scan.png", "image/png"),
            )
            .with_item_file_name("page-1")
            .with_field(FormField::new("Creator", "Ada"))
            .with_field(FormField::new("Rights", ""))
            .with_category("images"),
        )
        .with_form(FormItem::new(
            "draft",
            Cpid::new("ril-text"),
            ContentHolder::Empty,
        ))
        .with_form(FormItem::new(
            "paper",
            Cpid::new("ril-pdf"),
            ContentHolder::reference("https://example.org/papers/42.pdf"),
        ))
        .with_label(
            DatasetLabel::new(Cpid::new("ril-ds1"), "DS1 structure")
                .with_description("directory layout of DS1"),
        )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) 設定とコラボレータを用意
    let config = PreservationConfig::from_env()?;
    let registry = Arc::new(InMemoryRegistry::read_only("demo-registry"));
    let repository = Arc::new(InMemoryDatasetRepository::new());
    let manager = PreservationManager::new(repository.clone(), config);

    // (B) ジョブ投入（バックグラウンドで走る）
    let dataset = Arc::new(demo_dataset());
    let subject = dataset.subject_key();
    let accepted = manager.preserve(dataset, registry.clone()).await?;
    info!(accepted, "submitted");

    // (C) 完了をポーリングで待つ
    let job = manager.job(&subject)?;
    while !job.is_terminal() {
        info!(completed = job.completed(), total = job.total(), "waiting");
        sleep(Duration::from_millis(250)).await;
    }

    println!("{}", serde_json::to_string_pretty(&JobStatus::from_job(&job))?);
    info!(
        uploads = registry.contents().len(),
        saves = repository.saves().len(),
        "done"
    );

    // 同じデータセットは削除するまで再投入できない
    let again = manager.preserve(Arc::new(demo_dataset()), registry).await?;
    info!(accepted = again, "resubmitted");
    manager.delete_job(&SubjectKey::new("DS1"));
    Ok(())
}
