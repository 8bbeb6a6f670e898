//! Evaluation storage in Postgres

use sqlx::PgPool;
use tracing::debug;

use crate::error::EvalError;
use crate::handler::EvaluationSink;
use crate::payload::MoveEvaluationOutput;

/// Writes evaluations onto existing rows of `game_moves`.
#[derive(Clone)]
pub struct MoveStore {
    pool: PgPool,
}

impl MoveStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store `output` on its move row. The row must already exist.
    pub async fn save_evaluation(&self, output: &MoveEvaluationOutput) -> Result<(), EvalError> {
        let evaluation = serde_json::to_value(output)?;

        let result = sqlx::query(
            "UPDATE game_moves SET evaluation = $3, evaluated_at = NOW() \
             WHERE game_id = $1 AND move_id = $2",
        )
        .bind(&output.game_id)
        .bind(&output.move_id)
        .bind(&evaluation)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EvalError::MoveNotFound {
                game_id: output.game_id.clone(),
                move_id: output.move_id.clone(),
            });
        }

        debug!(game_id = %output.game_id, move_id = %output.move_id, "Stored evaluation");
        Ok(())
    }
}

impl EvaluationSink for MoveStore {
    async fn save(&self, output: &MoveEvaluationOutput) -> Result<(), EvalError> {
        self.save_evaluation(output).await
    }
}
