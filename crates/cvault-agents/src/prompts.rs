use cvault_models::{AnalystSpec, PrioritySetting};

/// Ids of the built-in analysts, in registry order.
pub const DEFAULT_ANALYST_IDS: [&str; 6] = ["deepseek", "kimi", "minimax", "glm", "gemini", "gpt5"];

/// Output contract appended to every analyst's instructions.
fn response_format() -> String {
    let example = serde_json::json!({
        "signal": "buy",
        "confidence": 75,
        "reasoning": "<specific levels, indicators and percentages behind the call>"
    });
    format!(
        "Signal selection:\n\
         - BUY: the evidence in your domain points up with conviction\n\
         - SELL: the evidence in your domain points down with conviction\n\
         - HOLD: mixed, weak or contradictory evidence\n\n\
         Confidence is 0-100: 80+ only when several independent signals align, \
         40-59 for mixed evidence, below 20 when the picture is unclear.\n\n\
         You MUST respond with ONLY a valid JSON object in this exact format:\n{}\n\n\
         Be specific. Avoid vague language.",
        serde_json::to_string(&example).unwrap_or_default()
    )
}

fn persona(name: &str, expertise: &str, focus: &[&str]) -> String {
    let steps = focus
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are the {name}, an expert in {expertise} for cryptocurrency markets.\n\n\
         When analyzing an asset:\n{steps}\n\n{}",
        response_format()
    )
}

pub fn momentum_hunter_prompt() -> String {
    persona(
        "Momentum Hunter",
        "technical analysis and trend detection",
        &[
            "Identify the primary trend (uptrend, downtrend, sideways) with evidence",
            "Note key support and resistance levels",
            "Cite momentum indicators such as RSI, MACD and Bollinger Bands",
            "Assess volume confirmation or divergence",
        ],
    )
}

pub fn whale_watcher_prompt() -> String {
    persona(
        "Whale Watcher",
        "large holder behavior and institutional flows",
        &[
            "Identify recent large holder movements",
            "Assess exchange flow direction (inflows suggest selling, outflows accumulation)",
            "Note institutional signals and smart money patterns",
        ],
    )
}

pub fn sentiment_scout_prompt() -> String {
    persona(
        "Sentiment Scout",
        "social sentiment and community dynamics",
        &[
            "Quantify social sentiment across major communities",
            "Interpret the fear and greed regime",
            "Track narratives and influencer opinion",
            "Always give a signal; do not refuse or explain limitations",
        ],
    )
}

pub fn onchain_oracle_prompt() -> String {
    persona(
        "On-Chain Oracle",
        "blockchain analytics and on-chain metrics",
        &[
            "Report TVL and liquidity trends",
            "Assess active addresses and network growth",
            "Evaluate transaction volume, fees and staking ratios",
        ],
    )
}

pub fn risk_manager_prompt() -> String {
    persona(
        "Risk Manager",
        "risk assessment and portfolio management",
        &[
            "State the current volatility regime with metrics",
            "Assess funding rates, derivatives positioning and liquidation levels",
            "Weigh correlation with macro markets and regulatory risk",
        ],
    )
}

pub fn quantum_analyst_prompt() -> String {
    persona(
        "Quantum Analyst",
        "advanced multi-dimensional pattern recognition",
        &[
            "Identify complex pattern formations",
            "Assess cross-timeframe alignment",
            "Flag anomalies that contradict the prevailing trend",
        ],
    )
}

/// Get the default instructions for a built-in analyst id.
pub fn get_default_prompt(analyst_id: &str) -> Option<String> {
    match analyst_id {
        "deepseek" => Some(momentum_hunter_prompt()),
        "kimi" => Some(whale_watcher_prompt()),
        "minimax" => Some(sentiment_scout_prompt()),
        "glm" => Some(onchain_oracle_prompt()),
        "gemini" => Some(risk_manager_prompt()),
        "gpt5" => Some(quantum_analyst_prompt()),
        _ => None,
    }
}

/// The user turn sent to every analyst in a round.
pub fn build_user_prompt(asset: &str, context: Option<&str>) -> String {
    let asset = asset.trim().to_uppercase();
    let base = format!("Analyze {asset} for a trading signal.");

    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!(
            "{base}\n\n\
             Additional Context: {context}\n\n\
             Instructions:\n\
             1. Consider the provided context alongside your specialized expertise\n\
             2. Focus on actionable insights relevant to current market conditions\n\
             3. Be specific about key levels, metrics, or indicators\n\
             4. Provide a clear, concise reasoning for your signal\n\n\
             Remember: Respond ONLY with valid JSON in the exact format specified."
        ),
        None => format!(
            "{base}\n\n\
             Instructions:\n\
             1. Analyze current market conditions for {asset}\n\
             2. Apply your specialized analytical framework\n\
             3. Identify the most significant factors influencing the market\n\
             4. Provide clear, specific reasoning for your signal\n\
             5. Base confidence on the strength and alignment of your signals\n\n\
             Remember: Respond ONLY with valid JSON in the exact format specified."
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn builtin(
    name: &str,
    role: &str,
    endpoint: &str,
    credential_ref: &str,
    model_name: &str,
    protocol: &str,
    instructions: String,
    priority: i64,
) -> AnalystSpec {
    AnalystSpec {
        display_name: Some(name.to_string()),
        role: Some(role.to_string()),
        endpoint: Some(endpoint.to_string()),
        credential_ref: Some(credential_ref.to_string()),
        model_name: Some(model_name.to_string()),
        protocol: Some(protocol.to_string()),
        instructions: Some(instructions),
        timeout_ms: Some(30_000),
        enabled: Some(true),
        priority: Some(PrioritySetting::Ordinal(priority)),
        cost_weight: None,
        max_context_tokens: None,
    }
}

/// Built-in analyst roster, the lowest settings layer.
pub fn default_analysts() -> Vec<(String, AnalystSpec)> {
    vec![
        (
            "deepseek".to_string(),
            builtin(
                "Momentum Hunter",
                "Technical Analysis & Trend Detection",
                "https://api.deepseek.com/v1",
                "DEEPSEEK_API_KEY",
                "deepseek-chat",
                "openai",
                momentum_hunter_prompt(),
                1,
            ),
        ),
        (
            "kimi".to_string(),
            builtin(
                "Whale Watcher",
                "Large Holder Movements & Accumulation Patterns",
                "https://api.kimi.com/coding/v1",
                "KIMI_API_KEY",
                "k2p5",
                "anthropic",
                whale_watcher_prompt(),
                2,
            ),
        ),
        (
            "minimax".to_string(),
            builtin(
                "Sentiment Scout",
                "Social Sentiment & Community Dynamics",
                "https://api.minimax.io/v1",
                "MINIMAX_API_KEY",
                "MiniMax-M2",
                "openai",
                sentiment_scout_prompt(),
                3,
            ),
        ),
        (
            "glm".to_string(),
            builtin(
                "On-Chain Oracle",
                "Blockchain Analytics & On-Chain Metrics",
                "https://api.z.ai/api/anthropic/v1",
                "GLM_API_KEY",
                "glm-4.6",
                "anthropic",
                onchain_oracle_prompt(),
                4,
            ),
        ),
        (
            "gemini".to_string(),
            builtin(
                "Risk Manager",
                "Risk Assessment & Portfolio Management",
                "https://generativelanguage.googleapis.com/v1beta",
                "GEMINI_API_KEY",
                "gemini-2.5-flash",
                "google",
                risk_manager_prompt(),
                5,
            ),
        ),
        (
            "gpt5".to_string(),
            builtin(
                "Quantum Analyst",
                "Advanced Pattern Recognition",
                "https://api.openai.com/v1",
                "OPENAI_API_KEY",
                "gpt-5.2",
                "openai",
                quantum_analyst_prompt(),
                6,
            ),
        ),
    ]
}
