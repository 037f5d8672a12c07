use askalytics_schema::{IntentResult, QueryIntent, Utterance};

use crate::matching::matched;

/// Minimum aggregate signature score an intent must clear. Below it the
/// classifier falls back to `BasicMetric` as a best guess.
const MIN_SIGNATURE_SCORE: f64 = 0.3;

/// Confidence floor for the best-guess fallback; stays within the ≤0.3
/// band the downstream components treat as "low confidence".
const FALLBACK_FLOOR: f64 = 0.2;

/// Scores are capped short of 1.0: keyword evidence alone never amounts
/// to certainty.
const MAX_CONFIDENCE: f64 = 0.95;

struct Keyword {
    term: &'static str,
    weight: f64,
}

macro_rules! kw {
    ($term:literal, $weight:literal) => {
        Keyword {
            term: $term,
            weight: $weight,
        }
    };
}

struct IntentSignature {
    intent: QueryIntent,
    keywords: &'static [Keyword],
}

/// Per-intent pattern signatures, mixed Chinese/English. Weights reflect
/// how strongly a phrase pins the intent on its own.
static SIGNATURES: &[IntentSignature] = &[
    IntentSignature {
        intent: QueryIntent::BasicMetric,
        keywords: &[
            kw!("有多少", 0.5),
            kw!("多少", 0.4),
            kw!("訪客", 0.4),
            kw!("用戶", 0.3),
            kw!("流量", 0.35),
            kw!("收入", 0.3),
            kw!("轉換", 0.5),
            kw!("how many", 0.5),
            kw!("visitors", 0.4),
            kw!("users", 0.3),
            kw!("traffic", 0.3),
            kw!("sessions", 0.3),
            kw!("pageviews", 0.3),
            kw!("revenue", 0.3),
        ],
    },
    IntentSignature {
        intent: QueryIntent::PageAnalysis,
        keywords: &[
            kw!("熱門", 0.5),
            kw!("頁面", 0.45),
            kw!("網頁", 0.45),
            kw!("跳出率", 0.4),
            kw!("top pages", 0.6),
            kw!("pages", 0.45),
            kw!("page", 0.4),
            kw!("bounce rate", 0.4),
            kw!("landing", 0.35),
        ],
    },
    IntentSignature {
        intent: QueryIntent::TrafficSource,
        keywords: &[
            kw!("來源", 0.55),
            kw!("渠道", 0.5),
            kw!("管道", 0.5),
            kw!("廣告", 0.4),
            kw!("traffic sources", 0.65),
            kw!("traffic source", 0.65),
            kw!("sources", 0.45),
            kw!("source", 0.4),
            kw!("channels", 0.5),
            kw!("channel", 0.5),
            kw!("campaign", 0.45),
            kw!("referral", 0.4),
        ],
    },
    IntentSignature {
        intent: QueryIntent::UserBehavior,
        keywords: &[
            kw!("行為", 0.55),
            kw!("停留時間", 0.5),
            kw!("停留", 0.4),
            kw!("會話深度", 0.5),
            kw!("behavior", 0.55),
            kw!("behaviour", 0.55),
            kw!("engagement", 0.5),
            kw!("session duration", 0.5),
            kw!("time on site", 0.5),
            kw!("retention", 0.45),
        ],
    },
    IntentSignature {
        intent: QueryIntent::Conversion,
        keywords: &[
            kw!("轉換漏斗", 0.65),
            kw!("轉換率", 0.6),
            kw!("轉換", 0.5),
            kw!("漏斗", 0.55),
            kw!("流失", 0.45),
            kw!("conversion rate", 0.65),
            kw!("conversions", 0.55),
            kw!("conversion", 0.55),
            kw!("funnel", 0.55),
            kw!("churn", 0.45),
            kw!("purchases", 0.4),
        ],
    },
    IntentSignature {
        intent: QueryIntent::Trend,
        keywords: &[
            kw!("趨勢", 0.6),
            kw!("變化", 0.45),
            kw!("增長", 0.5),
            kw!("成長", 0.5),
            kw!("下降", 0.5),
            kw!("trending", 0.55),
            kw!("trend", 0.6),
            kw!("growth", 0.5),
            kw!("decline", 0.45),
            kw!("over time", 0.5),
            kw!("day by day", 0.45),
        ],
    },
    IntentSignature {
        intent: QueryIntent::Comparison,
        keywords: &[
            kw!("比較", 0.6),
            kw!("對比", 0.6),
            kw!("相比", 0.6),
            kw!("比起", 0.5),
            kw!("compared to", 0.6),
            kw!("compared with", 0.6),
            kw!("compare", 0.55),
            kw!("versus", 0.55),
            kw!("vs", 0.5),
        ],
    },
];

/// Total function: every utterance maps to exactly one of the seven
/// intents with a confidence in [0,1]. Never fails, no side effects.
pub fn classify(utterance: &Utterance) -> IntentResult {
    let text = utterance.text.to_lowercase();

    let mut best_intent = QueryIntent::BasicMetric;
    let mut best_score = 0.0_f64;

    for signature in SIGNATURES {
        let score = score_signature(&text, signature);
        let wins = score > best_score
            || (score == best_score
                && score > 0.0
                && signature.intent.specificity() > best_intent.specificity());
        if wins {
            best_intent = signature.intent;
            best_score = score;
        }
    }

    if best_score < MIN_SIGNATURE_SCORE {
        // Best guess, flagged through confidence rather than an error.
        return IntentResult::new(QueryIntent::BasicMetric, best_score.max(FALLBACK_FLOOR));
    }

    IntentResult::new(best_intent, best_score.min(MAX_CONFIDENCE))
}

fn score_signature(text: &str, signature: &IntentSignature) -> f64 {
    let terms: Vec<&str> = signature.keywords.iter().map(|k| k.term).collect();
    let hits = matched(text, &terms);
    signature
        .keywords
        .iter()
        .zip(hits)
        .filter(|(_, hit)| *hit)
        .map(|(k, _)| k.weight)
        .sum()
}
