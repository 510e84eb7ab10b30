use gex_analyzer::config::GexConfig;
use gex_analyzer::gex::calculate_gex;
use gex_analyzer::models::ContractRecord;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rec(
        strike: f64,
        expiration: NaiveDate,
        dte: i64,
        call_oi: f64,
        call_gamma: f64,
        put_oi: f64,
        put_gamma: f64,
    ) -> ContractRecord {
        ContractRecord {
            strike,
            expiration,
            dte,
            call_oi,
            call_gamma,
            put_oi,
            put_gamma,
            ..Default::default()
        }
    }

    #[test]
    fn test_call_only_record_is_positive_oi_gamma_product() {
        let cfg = GexConfig::default();
        let records = vec![rec(6900.0, date(2026, 8, 14), 6, 320.0, 0.018, 0.0, 0.0)];

        let result = calculate_gex(&records, 6900.0, &cfg);

        assert_eq!(result.gex_by_strike.len(), 1);
        assert_eq!(result.gex_by_strike[0].value, 320.0 * 0.018 * 100.0);
        assert!(result.gex_by_strike[0].value > 0.0);
    }

    #[test]
    fn test_put_only_record_is_negated_oi_gamma_product() {
        let cfg = GexConfig::default();
        let records = vec![rec(6900.0, date(2026, 8, 14), 6, 0.0, 0.0, 410.0, 0.022)];

        let result = calculate_gex(&records, 6900.0, &cfg);

        assert_eq!(result.gex_by_strike[0].value, -(410.0 * 0.022 * 100.0));
        assert!(result.gex_by_strike[0].value < 0.0);
    }

    #[test]
    fn test_aggregate_column_uses_dte_window_not_displayed_columns() {
        let mut cfg = GexConfig::default();
        cfg.aggregate_dte = 30;
        // Only one displayed column, so DTE 10 and 45 are both off-table
        cfg.num_expiry_columns = 1;

        let records = vec![
            rec(6900.0, date(2026, 8, 13), 5, 100.0, 0.01, 0.0, 0.0),
            rec(6900.0, date(2026, 8, 18), 10, 200.0, 0.01, 0.0, 0.0),
            rec(6900.0, date(2026, 9, 22), 45, 400.0, 0.01, 0.0, 0.0),
        ];

        let result = calculate_gex(&records, 6900.0, &cfg);

        // DTE 5 and 10 qualify regardless of column selection; DTE 45 never
        let expected = (100.0 + 200.0) * 0.01 * 100.0;
        assert_eq!(result.surface.expiry_columns.len(), 1);
        assert_eq!(result.surface.rows[0].aggregate, expected);
    }

    #[test]
    fn test_empty_input_never_raises() {
        let cfg = GexConfig::default();
        let result = calculate_gex(&[], 6900.0, &cfg);
        assert!(result.surface.rows.is_empty());
        assert!(result.gex_by_strike.is_empty());
        assert!(result.net_oi_by_strike.is_empty());

        // Degenerate spot is also fine: the engine never reads it
        let result = calculate_gex(&[], 0.0, &cfg);
        assert!(result.surface.rows.is_empty());
    }

    #[test]
    fn test_exactly_n_expiry_columns_and_excluded_expirations_still_count() {
        let mut cfg = GexConfig::default();
        cfg.num_expiry_columns = 5;
        cfg.aggregate_dte = 30;

        // 8 weekly expirations at the same strike, DTE 3..=52
        let expirations: Vec<(NaiveDate, i64)> = (0..8i64)
            .map(|i| (date(2026, 8, 11) + chrono::Duration::days(7 * i), 3 + 7 * i))
            .collect();
        let records: Vec<ContractRecord> = expirations
            .iter()
            .map(|(exp, dte)| rec(6900.0, *exp, *dte, 100.0, 0.01, 0.0, 0.0))
            .collect();

        let result = calculate_gex(&records, 6900.0, &cfg);

        // Exactly 5 expiration columns; the first 5 expirations chronologically
        assert_eq!(result.surface.expiry_columns.len(), 5);
        assert_eq!(result.surface.expiry_columns[0], date(2026, 8, 11));
        assert_eq!(result.surface.expiry_columns[4], date(2026, 9, 8));

        let per_exp = 100.0 * 0.01 * 100.0;
        let row = &result.surface.rows[0];

        // All 8 expirations feed the per-strike series
        assert_eq!(result.gex_by_strike[0].value, 8.0 * per_exp);
        // DTE 3, 10, 17, 24 qualify for the 0-30 window (31, 38, 45, 52 do not)
        assert_eq!(row.aggregate, 4.0 * per_exp);
    }

    #[test]
    fn test_net_oi_sums_call_minus_put_across_expirations() {
        let cfg = GexConfig::default();
        // call OI split 60/40 across two expirations, put OI 40/0
        let records = vec![
            rec(6900.0, date(2026, 8, 14), 6, 60.0, 0.01, 40.0, 0.012),
            rec(6900.0, date(2026, 8, 21), 13, 40.0, 0.01, 0.0, 0.0),
        ];

        let result = calculate_gex(&records, 6900.0, &cfg);

        assert_eq!(result.net_oi_by_strike.len(), 1);
        assert_eq!(result.net_oi_by_strike[0].value, 100.0 - 40.0);
    }

    #[test]
    fn test_custom_contract_multiplier_scales_exposure() {
        let mut cfg = GexConfig::default();
        cfg.contract_multiplier = 50.0;
        let records = vec![rec(6900.0, date(2026, 8, 14), 6, 10.0, 0.02, 0.0, 0.0)];

        let result = calculate_gex(&records, 6900.0, &cfg);
        assert_eq!(result.gex_by_strike[0].value, 10.0 * 0.02 * 50.0);
    }
}
