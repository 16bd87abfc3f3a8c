use trouble_host::gatt::GattConnection;

use super::GattServer;

impl GattServer<'_> {
    /// Tell the owner's device the sound it asked for has finished.
    pub async fn notify_sound_completed(
        &self,
        conn: &GattConnection<'_, '_>,
    ) -> Result<(), trouble_host::Error> {
        self.tag.sound_completed.notify(conn, &true).await
    }

    /// Answer a motion poll.
    pub async fn notify_motion(
        &self,
        conn: &GattConnection<'_, '_>,
        moved: bool,
    ) -> Result<(), trouble_host::Error> {
        self.tag.motion.notify(conn, &moved).await
    }

    pub async fn notify_battery(
        &self,
        conn: &GattConnection<'_, '_>,
        percent: u8,
    ) -> Result<(), trouble_host::Error> {
        self.battery.level.notify(conn, &percent).await
    }
}
