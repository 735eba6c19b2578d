use burn::backend::ndarray::NdArray;
use seq2seq_translate::error::Seq2SeqError;
use seq2seq_translate::random::seeded_rng;
use seq2seq_translate::translation_data::{DatasetSplits, TokenBatch, TranslationBatch, TranslationData};
use seq2seq_translate::translation_vocabulary::Vocabulary;
use std::fs;
use std::path::{Path, PathBuf};

type TestBackend = NdArray;

fn create_test_dir(name: &str) -> PathBuf {
    let test_dir = PathBuf::from("tests").join(name);
    if test_dir.exists() {
        fs::remove_dir_all(&test_dir).ok();
    }
    fs::create_dir_all(&test_dir).unwrap();
    test_dir
}

fn cleanup_test_dir(test_dir: &Path) {
    if test_dir.exists() {
        fs::remove_dir_all(test_dir).ok();
    }
}

#[test]
fn test_token_batch_is_time_major_and_padded() {
    let batch = TokenBatch::from_sequences(&[vec![2, 5, 3], vec![2, 6, 7, 8, 3]], 0);

    assert_eq!(batch.seq_len(), 5);
    assert_eq!(batch.batch_size(), 2);

    // 短い文は右側がパディング
    assert_eq!(batch.get(0, 0), Some(2));
    assert_eq!(batch.get(2, 0), Some(3));
    assert_eq!(batch.get(3, 0), Some(0));
    assert_eq!(batch.get(4, 1), Some(3));
    assert_eq!(batch.get(5, 0), None);

    let tensor = batch.to_tensor::<TestBackend>(&Default::default());
    assert_eq!(tensor.dims(), [5, 2]);
    let values: Vec<i64> = tensor.to_data().iter::<i64>().collect();
    assert_eq!(values, vec![2, 2, 5, 6, 3, 7, 0, 8, 0, 3]);
}

#[test]
fn test_translation_batch_rejects_mismatched_sizes() {
    let src = TokenBatch::from_sequences(&[vec![2, 5, 3]], 0);
    let trg = TokenBatch::from_sequences(&[vec![2, 5, 3], vec![2, 6, 3]], 0);

    let result = TranslationBatch::new(src, trg);
    assert!(matches!(result, Err(Seq2SeqError::BatchShape(_))));
}

#[test]
fn test_read_pairs_skips_malformed_lines() {
    let test_dir = create_test_dir("temp_data_pairs");
    let path = test_dir.join("pairs.tsv");
    fs::write(
        &path,
        "# コメント\nein mann .\ta man .\n\nkein tab hier\neine frau .\ta woman .\n\t\n",
    )
    .unwrap();

    let pairs = TranslationData::read_pairs(&path).expect("読み込み失敗");
    assert_eq!(
        pairs,
        vec![
            ("ein mann .".to_string(), "a man .".to_string()),
            ("eine frau .".to_string(), "a woman .".to_string()),
        ]
    );

    cleanup_test_dir(&test_dir);
}

#[test]
fn test_batches_cover_all_samples() {
    let pairs: Vec<(String, String)> = (0..5)
        .map(|i| (format!("quelle {}", i), format!("ziel {} .", i)))
        .collect();
    let src_vocab = Vocabulary::build(pairs.iter().map(|(s, _)| s.as_str()), 1);
    let trg_vocab = Vocabulary::build(pairs.iter().map(|(_, t)| t.as_str()), 1);

    let data = TranslationData::from_pairs(&pairs, &src_vocab, &trg_vocab, false);
    assert_eq!(data.len(), 5);

    let batches = data.batches(2, src_vocab.pad_id, trg_vocab.pad_id).expect("バッチ作成失敗");
    let sizes: Vec<usize> = batches.iter().map(|b| b.batch_size()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    // シャッフルしてもサンプル数は同じで、シードが同じなら順序も同じ
    let shuffled_a = data
        .shuffled_batches(2, src_vocab.pad_id, trg_vocab.pad_id, &mut seeded_rng(9))
        .expect("バッチ作成失敗");
    let shuffled_b = data
        .shuffled_batches(2, src_vocab.pad_id, trg_vocab.pad_id, &mut seeded_rng(9))
        .expect("バッチ作成失敗");
    let total: usize = shuffled_a.iter().map(|b| b.batch_size()).sum();
    assert_eq!(total, 5);
    for (a, b) in shuffled_a.iter().zip(&shuffled_b) {
        assert_eq!(a.src, b.src);
        assert_eq!(a.trg, b.trg);
    }

    assert!(matches!(
        data.batches(0, src_vocab.pad_id, trg_vocab.pad_id),
        Err(Seq2SeqError::InvalidConfig(_))
    ));
}

#[test]
fn test_dataset_splits_build_vocab_from_train() {
    let test_dir = create_test_dir("temp_data_splits");
    fs::write(
        test_dir.join("train.tsv"),
        "ein mann .\ta man .\nein hund .\ta dog .\n",
    )
    .unwrap();
    fs::write(test_dir.join("valid.tsv"), "eine katze .\ta cat .\n").unwrap();
    fs::write(test_dir.join("test.tsv"), "ein mann .\ta man .\n").unwrap();

    let splits = DatasetSplits::load(&test_dir, 1, true).expect("データ読み込み失敗");
    assert_eq!(splits.train.len(), 2);
    assert_eq!(splits.valid.len(), 1);
    assert_eq!(splits.test.len(), 1);

    // 検証データにしかない単語は <unk>
    assert_eq!(splits.trg_vocab.token_to_id("cat"), splits.trg_vocab.unk_id);

    // ソースは単語列のみ逆順
    let (src, trg) = &splits.test.samples[0];
    assert_eq!(splits.src_vocab.decode(src), ". mann ein");
    assert_eq!(splits.trg_vocab.decode(trg), "a man .");

    cleanup_test_dir(&test_dir);
}
