use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const SOS_TOKEN: &str = "<sos>";
pub const EOS_TOKEN: &str = "<eos>";

/// 単語単位の語彙（ソース・ターゲット共通）
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Vocabulary {
    id_to_word: Vec<String>,
    #[serde(skip)]
    word_to_id: HashMap<String, usize>,
    pub pad_id: usize, // Padding
    pub unk_id: usize, // Unknown
    pub sos_id: usize, // Start of Sequence
    pub eos_id: usize, // End of Sequence
}

impl Vocabulary {
    /// コーパスから語彙を構築（`min_freq` 回未満の単語は <unk> 扱い）
    pub fn build<'a, I>(sentences: I, min_freq: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for sentence in sentences {
            for word in tokenize(sentence) {
                *counts.entry(word).or_insert(0) += 1;
            }
        }

        // 出現頻度の降順、同数ならアルファベット順（再現性のため）
        let mut frequent: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_freq)
            .collect();
        frequent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        // 特殊トークン
        let mut words = vec![
            PAD_TOKEN.to_string(), // ID 0
            UNK_TOKEN.to_string(), // ID 1
            SOS_TOKEN.to_string(), // ID 2
            EOS_TOKEN.to_string(), // ID 3
        ];
        words.extend(frequent.into_iter().map(|(word, _)| word));

        Self::from_words(words)
    }

    fn from_words(id_to_word: Vec<String>) -> Self {
        let word_to_id = id_to_word
            .iter()
            .enumerate()
            .map(|(id, word)| (word.clone(), id))
            .collect();

        Vocabulary {
            id_to_word,
            word_to_id,
            pad_id: 0,
            unk_id: 1,
            sos_id: 2,
            eos_id: 3,
        }
    }

    pub fn len(&self) -> usize {
        self.id_to_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_word.is_empty()
    }

    pub fn token_to_id(&self, word: &str) -> usize {
        self.word_to_id.get(word).copied().unwrap_or(self.unk_id)
    }

    pub fn id_to_token(&self, id: usize) -> Option<&str> {
        self.id_to_word.get(id).map(String::as_str)
    }

    /// 文をトークンIDに変換（<sos>/<eos> なし）
    pub fn encode(&self, text: &str) -> Vec<usize> {
        tokenize(text)
            .iter()
            .map(|word| self.token_to_id(word))
            .collect()
    }

    /// モデル入力用のシーケンス: [<sos>, w1, ..., wN, <eos>]
    ///
    /// `reverse` の場合は単語列のみ逆順にする
    pub fn encode_sequence(&self, text: &str, reverse: bool) -> Vec<usize> {
        let mut tokens = self.encode(text);
        if reverse {
            tokens.reverse();
        }

        let mut sequence = Vec::with_capacity(tokens.len() + 2);
        sequence.push(self.sos_id);
        sequence.extend(tokens);
        sequence.push(self.eos_id);
        sequence
    }

    /// トークンIDを文に変換（特殊トークンは出力しない）
    pub fn decode(&self, token_ids: &[usize]) -> String {
        token_ids
            .iter()
            .filter(|&&id| id != self.pad_id && id != self.sos_id && id != self.eos_id)
            .filter_map(|&id| self.id_to_token(id))
            .collect::<Vec<&str>>()
            .join(" ")
    }

    /// JSONで保存
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("語彙ファイルを書き込めません: {}", path.display()))?;
        Ok(())
    }

    /// JSONから読み込み
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("語彙ファイルが読み込めません: {}", path.display()))?;
        let saved: Vocabulary = serde_json::from_str(&json)
            .with_context(|| format!("語彙ファイルの形式が不正です: {}", path.display()))?;

        let mut vocab = Self::from_words(saved.id_to_word);
        vocab.pad_id = saved.pad_id;
        vocab.unk_id = saved.unk_id;
        vocab.sos_id = saved.sos_id;
        vocab.eos_id = saved.eos_id;
        Ok(vocab)
    }
}

/// 小文字化し、句読点を分離して空白で分割
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace(',', " ,")
        .replace('.', " .")
        .replace('!', " !")
        .replace('?', " ?")
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}
