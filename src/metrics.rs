use crate::config::{ModelConfig, TrainingConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Perplexity = exp(loss)
pub fn perplexity(loss: f64) -> f64 {
    loss.exp()
}

/// 経過時間を (分, 秒) に分解
pub fn split_elapsed(elapsed: Duration) -> (u64, u64) {
    let secs = elapsed.as_secs();
    (secs / 60, secs % 60)
}

/// 1エポック分の結果
#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch: usize,
    pub elapsed: Duration,
    pub train_loss: f64,
    pub valid_loss: f64,
    /// 検証損失が改善し、チェックポイントを保存したか
    pub improved: bool,
}

impl EpochReport {
    pub fn print(&self) {
        let (mins, secs) = split_elapsed(self.elapsed);
        println!("Epoch: {:02} | Time: {}m {}s", self.epoch, mins, secs);
        println!(
            "\tTrain Loss: {:.3} | Train PPL: {:7.3}",
            self.train_loss,
            perplexity(self.train_loss)
        );
        println!(
            "\t Val. Loss: {:.3} |  Val. PPL: {:7.3}",
            self.valid_loss,
            perplexity(self.valid_loss)
        );
    }
}

/// テスト損失の表示
pub fn print_test_loss(test_loss: f64) {
    println!(
        "| Test Loss: {:.3} | Test PPL: {:7.3} |",
        test_loss,
        perplexity(test_loss)
    );
}

/// 訓練メトリクス
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// エポックごとの訓練損失
    pub train_loss_history: Vec<f64>,
    /// エポックごとの検証損失
    pub valid_loss_history: Vec<f64>,
    /// エポックごとの所要秒数
    pub epoch_seconds: Vec<f64>,
    pub best_valid_loss: Option<f64>,
    pub best_epoch: Option<usize>,
    /// ベストチェックポイントでのテスト損失
    pub test_loss: Option<f64>,
}

impl TrainingMetrics {
    pub fn record(&mut self, report: &EpochReport) {
        self.train_loss_history.push(report.train_loss);
        self.valid_loss_history.push(report.valid_loss);
        self.epoch_seconds.push(report.elapsed.as_secs_f64());

        if report.improved {
            self.best_valid_loss = Some(report.valid_loss);
            self.best_epoch = Some(report.epoch);
        }
    }
}

/// メタデータ
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Metadata {
    pub crate_version: String,
    pub trained_at: String,
    pub num_params: usize,
}

impl Metadata {
    pub fn now(num_params: usize) -> Self {
        Self {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Local::now().to_rfc3339(),
            num_params,
        }
    }
}

/// 統合メトリクスファイル
#[derive(Serialize, Debug)]
pub struct MetricsFile<'a> {
    pub model_config: &'a ModelConfig,
    pub training_config: &'a TrainingConfig,
    pub training: &'a TrainingMetrics,
    pub metadata: &'a Metadata,
}

/// metrics.json と README.md を保存
pub fn save_metrics(
    save_dir: &Path,
    model_config: &ModelConfig,
    training_config: &TrainingConfig,
    training_metrics: &TrainingMetrics,
    metadata: &Metadata,
) -> Result<()> {
    fs::create_dir_all(save_dir)?;

    let metrics_file = MetricsFile {
        model_config,
        training_config,
        training: training_metrics,
        metadata,
    };

    let metrics_json = serde_json::to_string_pretty(&metrics_file)?;
    fs::write(save_dir.join("metrics.json"), metrics_json)?;
    tracing::info!("メトリクスを保存: {}", save_dir.join("metrics.json").display());

    save_readme(save_dir, model_config, training_config, training_metrics, metadata)?;

    Ok(())
}

fn format_optional(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3} (PPL {:.3})", v, perplexity(v)))
        .unwrap_or_else(|| "-".to_string())
}

/// README.mdを自動生成
fn save_readme(
    save_dir: &Path,
    model_config: &ModelConfig,
    training_config: &TrainingConfig,
    training_metrics: &TrainingMetrics,
    metadata: &Metadata,
) -> Result<()> {
    let readme_content = format!(
        r#"# Seq2Seq 翻訳モデル訓練結果

## モデル設定

- **種類**: {:?}
- **ソース語彙サイズ**: {}
- **ターゲット語彙サイズ**: {}
- **埋め込み次元**: enc {} / dec {}
- **隠れ次元**: enc {} / dec {}
- **再帰層数**: {}
- **パラメータ数**: {}

## 訓練設定

- **エポック数**: {}
- **学習率**: {}
- **バッチサイズ**: {}
- **勾配クリップ**: {}
- **Teacher Forcing率**: {}
- **Dropout**: enc {} / dec {}
- **シード**: {}
- **オプティマイザ**: Adam

## 結果

- **ベスト検証Loss**: {}（エポック {}）
- **テストLoss**: {}

## 訓練情報

- **訓練日時**: {}
- **バージョン**: {}

## 使用方法

```bash
cargo run --release -- translate --checkpoint {} --backend ndarray "ein mann fährt fahrrad ."
cargo run --release -- evaluate --checkpoint {} --data data/toy
```

## ファイル構成

- `model.bin`: ベスト検証Lossのモデル重み（Burnバイナリ形式）
- `model_config.json` / `training_config.json`: 設定
- `src_vocab.json` / `trg_vocab.json`: 語彙
- `metrics.json`: 損失履歴
- `README.md`: このファイル
"#,
        model_config.variant,
        model_config.src_vocab_size,
        model_config.trg_vocab_size,
        model_config.enc_emb_dim,
        model_config.dec_emb_dim,
        model_config.enc_hidden_dim,
        model_config.dec_hidden_dim,
        model_config.recurrent_layers(),
        metadata.num_params,
        training_config.epochs,
        training_config.learning_rate,
        training_config.batch_size,
        training_config.clip,
        training_config.teacher_forcing,
        training_config.encoder_dropout,
        training_config.decoder_dropout,
        training_config.seed,
        format_optional(training_metrics.best_valid_loss),
        training_metrics
            .best_epoch
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string()),
        format_optional(training_metrics.test_loss),
        metadata.trained_at,
        metadata.crate_version,
        save_dir.display(),
        save_dir.display(),
    );

    fs::write(save_dir.join("README.md"), readme_content)?;
    tracing::info!("READMEを生成: {}", save_dir.join("README.md").display());

    Ok(())
}
