//! Classification metrics

use crate::error::{Result, TrainError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::decision_tree::unique_classes;

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(TrainError::ShapeError {
            expected: format!("y_pred length = {}", y_true.len()),
            actual: format!("y_pred length = {}", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(TrainError::InvalidInput("cannot score empty predictions".to_string()));
    }
    Ok(())
}

/// Fraction of exactly matching labels
pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;

    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 1e-9)
        .count();

    Ok(correct as f64 / y_true.len() as f64)
}

/// Confusion matrix, rows are true labels and columns predicted labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Labels in row/column order
    pub labels: Vec<f64>,
    /// Counts
    pub matrix: Array2<usize>,
}

impl ConfusionMatrix {
    /// Build over the union of labels present in either vector
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        check_lengths(y_true, y_pred)?;

        let all: Array1<f64> = y_true.iter().chain(y_pred.iter()).copied().collect();
        let labels = unique_classes(&all);
        let position = |v: f64| labels.iter().position(|l| (l - v).abs() < 1e-9).unwrap_or(0);

        let mut matrix = Array2::zeros((labels.len(), labels.len()));
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            matrix[[position(t), position(p)]] += 1;
        }

        Ok(Self { labels, matrix })
    }

    fn true_positives(&self, k: usize) -> usize {
        self.matrix[[k, k]]
    }

    fn predicted(&self, k: usize) -> usize {
        self.matrix.column(k).sum()
    }

    fn support(&self, k: usize) -> usize {
        self.matrix.row(k).sum()
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Averaged scores over all classes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 with macro and weighted averages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    /// Decimal places used by the text rendering
    pub digits: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationReport {
    /// Build a report, naming classes by their label value
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        Self::compute_with_names(y_true, y_pred, &[])
    }

    /// Build a report; label `k` is shown as `target_names[k]` when present
    pub fn compute_with_names(
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        target_names: &[String],
    ) -> Result<Self> {
        let cm = ConfusionMatrix::compute(y_true, y_pred)?;

        let classes: Vec<ClassMetrics> = cm
            .labels
            .iter()
            .enumerate()
            .map(|(k, &label)| {
                let tp = cm.true_positives(k);
                let precision = ratio(tp, cm.predicted(k));
                let recall = ratio(tp, cm.support(k));
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                let name = target_names
                    .get(label.round() as usize)
                    .filter(|_| label >= 0.0 && label.fract() == 0.0)
                    .cloned()
                    .unwrap_or_else(|| format_label(label));

                ClassMetrics {
                    label: name,
                    precision,
                    recall,
                    f1_score,
                    support: cm.support(k),
                }
            })
            .collect();

        let n = classes.len() as f64;
        let total: usize = classes.iter().map(|c| c.support).sum();
        let macro_avg = AverageMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1_score: classes.iter().map(|c| c.f1_score).sum::<f64>() / n,
            support: total,
        };

        let weight = |c: &ClassMetrics| ratio(c.support, total);
        let weighted_avg = AverageMetrics {
            precision: classes.iter().map(|c| c.precision * weight(c)).sum(),
            recall: classes.iter().map(|c| c.recall * weight(c)).sum(),
            f1_score: classes.iter().map(|c| c.f1_score * weight(c)).sum(),
            support: total,
        };

        Ok(Self {
            classes,
            accuracy: accuracy_score(y_true, y_pred)?,
            macro_avg,
            weighted_avg,
            digits: 2,
        })
    }

    /// Set decimal places for the text rendering
    pub fn with_digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }
}

fn format_label(label: f64) -> String {
    if label.fract() == 0.0 {
        format!("{}", label as i64)
    } else {
        format!("{}", label)
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(0);
        let d = self.digits;

        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support",
            width = width
        )?;
        writeln!(f)?;

        for c in &self.classes {
            writeln!(
                f,
                "{:>width$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}",
                c.label, c.precision, c.recall, c.f1_score, c.support,
                width = width,
                d = d
            )?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9.d$} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support,
            width = width,
            d = d
        )?;

        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}",
                name, avg.precision, avg.recall, avg.f1_score, avg.support,
                width = width,
                d = d
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];

        let acc = accuracy_score(&y_true, &y_pred).unwrap();
        assert!((acc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_errors() {
        assert!(matches!(
            accuracy_score(&array![1.0, 2.0], &array![1.0]),
            Err(TrainError::ShapeError { .. })
        ));
        assert!(matches!(
            accuracy_score(&Array1::zeros(0), &Array1::zeros(0)),
            Err(TrainError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_confusion_matrix() {
        let y_true = array![0.0, 0.0, 1.0, 2.0, 2.0];
        let y_pred = array![0.0, 1.0, 1.0, 2.0, 0.0];

        let cm = ConfusionMatrix::compute(&y_true, &y_pred).unwrap();
        assert_eq!(cm.labels, vec![0.0, 1.0, 2.0]);
        assert_eq!(cm.matrix, array![[1usize, 1, 0], [0, 1, 0], [1, 0, 1]]);
    }

    #[test]
    fn test_report_values() {
        let y_true = array![0.0, 0.0, 1.0, 2.0, 2.0];
        let y_pred = array![0.0, 1.0, 1.0, 2.0, 0.0];

        let report = ClassificationReport::compute(&y_true, &y_pred).unwrap();

        let c0 = &report.classes[0];
        assert_eq!(c0.label, "0");
        assert!((c0.precision - 0.5).abs() < 1e-12);
        assert!((c0.recall - 0.5).abs() < 1e-12);
        assert_eq!(c0.support, 2);

        let c2 = &report.classes[2];
        assert!((c2.precision - 1.0).abs() < 1e-12);
        assert!((c2.recall - 0.5).abs() < 1e-12);
        assert!((c2.f1_score - 2.0 / 3.0).abs() < 1e-12);

        assert!((report.accuracy - 0.6).abs() < 1e-12);
        assert_eq!(report.macro_avg.support, 5);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let y_true = array![0.0, 0.0, 1.0];
        let y_pred = array![0.0, 0.0, 0.0];

        let report = ClassificationReport::compute(&y_true, &y_pred).unwrap();
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1_score, 0.0);
    }

    #[test]
    fn test_report_rendering() {
        let y_true = array![0.0, 1.0, 2.0];
        let y_pred = array![0.0, 1.0, 2.0];
        let names = vec!["setosa".to_string(), "versicolor".to_string(), "virginica".to_string()];

        let report = ClassificationReport::compute_with_names(&y_true, &y_pred, &names).unwrap();
        let text = report.to_string();

        assert!(text.contains("precision"));
        assert!(text.contains("  versicolor"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("1.00"));
        assert_eq!(text.lines().count(), 9);
    }
}
