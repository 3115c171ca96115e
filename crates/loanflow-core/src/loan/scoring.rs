//! Credit scoring for loan applications.

use loanflow_types::loan::LoanApplication;

/// Produces a creditworthiness score on a 1-100 scale.
pub trait CreditScorer: Send + Sync {
    fn score(&self, application: &LoanApplication) -> u32;
}

/// Deterministic scorer based on the income to loan amount ratio.
///
/// `score = round(50 + 15 * ln(income / amount))`, clamped to 1..=100. An
/// applicant asking for their annual income scores 50; asking for a tenth of
/// it scores about 85.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl CreditScorer for RuleBasedScorer {
    fn score(&self, application: &LoanApplication) -> u32 {
        if application.annual_income <= 0.0 {
            return 1;
        }
        if application.loan_amount <= 0.0 {
            return 100;
        }
        let ratio = application.annual_income / application.loan_amount;
        let raw = 50.0 + 15.0 * ratio.ln();
        raw.round().clamp(1.0, 100.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use loanflow_types::loan::LoanPurpose;

    fn app(amount: f64, income: f64) -> LoanApplication {
        LoanApplication {
            application_id: "LOAN-T".into(),
            applicant_name: "Test".into(),
            email: String::new(),
            phone: String::new(),
            loan_amount: amount,
            loan_purpose: LoanPurpose::Personal,
            annual_income: income,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn score_follows_income_ratio() {
        let scorer = RuleBasedScorer;
        assert_eq!(scorer.score(&app(50_000.0, 50_000.0)), 50);
        assert_eq!(scorer.score(&app(5_000.0, 50_000.0)), 85);
        assert!(scorer.score(&app(3_000.0, 75_000.0)) > 60);
    }

    #[test]
    fn score_is_clamped() {
        let scorer = RuleBasedScorer;
        assert_eq!(scorer.score(&app(1.0, 1e12)), 100);
        assert_eq!(scorer.score(&app(1e12, 1.0)), 1);
        assert_eq!(scorer.score(&app(1000.0, 0.0)), 1);
        assert_eq!(scorer.score(&app(0.0, 1000.0)), 100);
    }
}
